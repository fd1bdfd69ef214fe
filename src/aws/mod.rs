//! SigV4-signed clients for the AWS services this system touches:
//! DynamoDB (channel store), EventBridge (event delivery), S3 (object
//! copies), and the Lambda control plane (webhook-address detection).

pub mod client;
pub mod dynamodb;
pub mod error;
pub mod eventbridge;
pub mod lambda;
pub mod s3;
pub mod signing;

pub use client::AwsClient;
pub use error::AwsError;
pub use signing::Credentials;
