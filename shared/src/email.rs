use aws_sdk_sesv2::types::{Body, Content, Destination, EmailContent, Message};
use aws_sdk_sesv2::Client as SesClient;
use bughunt_atoms::{ServiceError, ServiceResult};

fn content(data: &str) -> ServiceResult<Content> {
    Content::builder()
        .data(data)
        .charset("UTF-8")
        .build()
        .map_err(|e| ServiceError::Upstream(format!("Failed to build email content: {}", e)))
}

/// Send a plain-text email through SES.
pub async fn send_email(
    ses_client: &SesClient,
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
) -> ServiceResult<()> {
    if !to.contains('@') {
        return Err(ServiceError::Validation(format!("'{}' is not an email address", to)));
    }

    let message = Message::builder()
        .subject(content(subject)?)
        .body(Body::builder().text(content(body)?).build())
        .build();

    let result = ses_client
        .send_email()
        .from_email_address(from)
        .destination(Destination::builder().to_addresses(to).build())
        .content(EmailContent::builder().simple(message).build())
        .send()
        .await
        .map_err(|e| ServiceError::upstream("SES send_email", e))?;

    tracing::info!(to, subject, message_id = ?result.message_id(), "email sent");
    Ok(())
}
