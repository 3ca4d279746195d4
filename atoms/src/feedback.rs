use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::item::{opt_s, put_opt, Item};
use crate::users::model::Role;

const ADMIN_MARKER: &str = "[ADMIN FEEDBACK]";
const COACH_MARKER: &str = "[COACH FEEDBACK]";

pub const COACH_ATTRIBUTE: &str = "coach_feedback";
pub const ADMIN_ATTRIBUTE: &str = "admin_feedback";
/// Combined string written before feedback was split by role.
pub const LEGACY_ATTRIBUTE: &str = "feedback";

/// Longest accepted feedback text per role.
pub const MAX_FEEDBACK_BYTES: usize = 10_000;

/// Reviewer commentary, one field per reviewing role.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Feedback {
    pub coach: Option<String>,
    pub admin: Option<String>,
}

impl Feedback {
    /// Split a legacy single-string feedback (`[ADMIN FEEDBACK] ... [COACH FEEDBACK] ...`,
    /// either order, either part optional). Unmarked text is coach feedback.
    pub fn parse_legacy(raw: &str) -> Feedback {
        let admin_at = raw.find(ADMIN_MARKER);
        let coach_at = raw.find(COACH_MARKER);

        let section = |start: usize, marker: &str, other: Option<usize>| -> Option<String> {
            let body_start = start + marker.len();
            let end = other.filter(|o| *o > start).unwrap_or(raw.len());
            non_empty(&raw[body_start..end])
        };

        match (admin_at, coach_at) {
            (None, None) => Feedback {
                coach: non_empty(raw),
                admin: None,
            },
            (admin_at, coach_at) => {
                let leading_end = [admin_at, coach_at].into_iter().flatten().min().unwrap_or(0);
                let leading = non_empty(&raw[..leading_end]);
                Feedback {
                    admin: admin_at.and_then(|a| section(a, ADMIN_MARKER, coach_at)),
                    coach: coach_at
                        .and_then(|c| section(c, COACH_MARKER, admin_at))
                        .or(leading),
                }
            }
        }
    }

    /// Record feedback under the author's role.
    pub fn set(&mut self, role: Role, text: &str) -> Result<(), ServiceError> {
        let field = match role {
            Role::Coach => &mut self.coach,
            Role::Admin => &mut self.admin,
            Role::Hunter => {
                return Err(ServiceError::Forbidden("Hunters cannot leave reviewer feedback".into()))
            }
        };
        let text = non_empty(text);
        if text.as_ref().is_some_and(|t| t.len() > MAX_FEEDBACK_BYTES) {
            return Err(ServiceError::Validation(format!(
                "feedback is longer than {} bytes",
                MAX_FEEDBACK_BYTES
            )));
        }
        *field = text;
        Ok(())
    }

    /// Stored attribute holding a role's feedback; hunters have none.
    pub fn attribute_for(role: Role) -> Option<&'static str> {
        match role {
            Role::Coach => Some(COACH_ATTRIBUTE),
            Role::Admin => Some(ADMIN_ATTRIBUTE),
            Role::Hunter => None,
        }
    }

    pub fn for_role(&self, role: Role) -> Option<&str> {
        match role {
            Role::Coach => self.coach.as_deref(),
            Role::Admin => self.admin.as_deref(),
            Role::Hunter => None,
        }
    }

    pub fn write_to(&self, item: &mut Item) {
        put_opt(item, COACH_ATTRIBUTE, &self.coach);
        put_opt(item, ADMIN_ATTRIBUTE, &self.admin);
    }

    /// Read structured feedback, falling back to a legacy `feedback` attribute.
    pub fn read_from(item: &Item) -> Feedback {
        let coach = opt_s(item, COACH_ATTRIBUTE);
        let admin = opt_s(item, ADMIN_ATTRIBUTE);
        if coach.is_some() || admin.is_some() {
            return Feedback { coach, admin };
        }
        opt_s(item, LEGACY_ATTRIBUTE)
            .map(|raw| Feedback::parse_legacy(&raw))
            .unwrap_or_default()
    }
}

fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
