use aws_config::Region;
use aws_sdk_sqs::config::SharedCredentialsProvider;

use crate::config::SqsConfig;

/// Creates an AWS SQS client using credentials and configuration from the environment.
///
/// This function loads AWS configuration from environment variables such as:
/// - `AWS_ACCESS_KEY_ID`
/// - `AWS_SECRET_ACCESS_KEY`
/// - `AWS_REGION`
/// - `AWS_PROFILE`
///
/// # Example
///
/// ```rust,no_run
/// use rs_sqs_consumer::client::create_sqs_client_from_env;
///
/// #[tokio::main]
/// async fn main() {
///     let client = create_sqs_client_from_env().await;
///     // Use the client...
/// }
/// ```
pub async fn create_sqs_client_from_env() -> aws_sdk_sqs::Client {
    let config = aws_config::load_from_env().await;
    aws_sdk_sqs::Client::new(&config)
}

/// Creates an AWS SQS client with explicitly provided credentials and region.
///
/// # Arguments
///
/// * `access_key_id` - The AWS access key ID
/// * `secret_access_key` - The AWS secret access key
/// * `region` - The AWS region (e.g., "us-east-1", "eu-west-1")
pub fn create_sqs_client_with_credentials(
    access_key_id: &str,
    secret_access_key: &str,
    region: &str,
) -> aws_sdk_sqs::Client {
    let credentials =
        aws_sdk_sqs::config::Credentials::new(access_key_id, secret_access_key, None, None, "aws");

    let shared_credentials = SharedCredentialsProvider::new(credentials);

    let config = aws_sdk_sqs::config::Builder::new()
        .behavior_version(aws_sdk_sqs::config::BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(shared_credentials)
        .build();

    aws_sdk_sqs::Client::from_conf(config)
}

/// Creates a client for the configured region.
///
/// Explicit keys in `config` take precedence; otherwise the default credential
/// chain is used with the configured region.
pub async fn create_sqs_client(config: &SqsConfig) -> aws_sdk_sqs::Client {
    match (&config.access_key_id, &config.secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => {
            create_sqs_client_with_credentials(access_key_id, secret_access_key, &config.region)
        }
        _ => {
            let shared = aws_config::from_env()
                .region(Region::new(config.region.clone()))
                .load()
                .await;
            aws_sdk_sqs::Client::new(&shared)
        }
    }
}
