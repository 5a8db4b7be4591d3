use async_trait::async_trait;

use super::{ClientError, InternalClient};
use crate::domain::UserProfile;
use crate::ports::UserDirectory;

#[derive(Clone)]
pub struct UserClient {
    inner: InternalClient,
}

impl UserClient {
    pub fn new(inner: InternalClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl UserDirectory for UserClient {
    async fn get_user(&self, id: i64) -> Result<UserProfile, ClientError> {
        self.inner
            .get_data(&format!("/api/v1/users/{}", id), &format!("user {}", id))
            .await
    }
}
