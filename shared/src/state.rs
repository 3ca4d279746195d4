use aws_config::SdkConfig;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sesv2::Client as SesClient;

use crate::config::Config;

/// Clients and settings shared by every invocation of a warm container.
pub struct AppState {
    pub dynamo_client: DynamoClient,
    pub s3_client: S3Client,
    pub cognito_client: CognitoClient,
    pub ses_client: SesClient,
    pub config: Config,
}

impl AppState {
    pub fn new(sdk_config: &SdkConfig, config: Config) -> Self {
        Self {
            dynamo_client: DynamoClient::new(sdk_config),
            s3_client: S3Client::new(sdk_config),
            cognito_client: CognitoClient::new(sdk_config),
            ses_client: SesClient::new(sdk_config),
            config,
        }
    }

    pub fn table(&self) -> &str {
        &self.config.table_name
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket_name
    }

    pub fn jwt_secret(&self) -> &[u8] {
        self.config.jwt_secret.as_bytes()
    }
}
