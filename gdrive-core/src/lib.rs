mod client;
mod oauth;

pub use client::{ApiErrorClass, Credential, DriveClient, DriveError, DriveFile, FileList};
pub use oauth::{ClientSecrets, OAuthClient, OAuthError, OAuthToken};
