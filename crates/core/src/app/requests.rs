use crate::domain::{Credentials, RepoRecord};
use crate::error::{CoreError, Result};

/// User input for a new clone (or for editing a failed one)
#[derive(Debug, Clone, Default)]
pub struct CloneRequest {
    pub name: String,
    pub address: String,
    pub user_name: Option<String>,
    pub password: Option<String>,
    /// Folder of the failed record this request replaces
    pub replaces: Option<String>,
}

impl CloneRequest {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, user_name: impl Into<String>, password: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self.password = Some(password.into());
        self
    }

    pub fn replacing(mut self, folder: impl Into<String>) -> Self {
        self.replaces = Some(folder.into());
        self
    }

    /// Check the request and split it into the record to store and the
    /// credentials to hand to the clone.
    pub fn validate(&self) -> Result<(RepoRecord, Option<Credentials>)> {
        let name = self.name.trim();
        let address = self.address.trim();
        let user_name = non_empty(self.user_name.as_deref());
        let password = non_empty(self.password.as_deref());

        if name.is_empty() {
            return Err(CoreError::invalid_request("name must not be empty"));
        }
        if address.is_empty() {
            return Err(CoreError::invalid_request("address must not be empty"));
        }
        match (user_name, password) {
            (Some(_), None) => return Err(CoreError::invalid_request("password is required with a user name")),
            (None, Some(_)) => return Err(CoreError::invalid_request("user name is required with a password")),
            _ => {}
        }
        if !address.starts_with("http://") && !address.starts_with("https://") {
            return Err(CoreError::invalid_request("address must start with http:// or https://"));
        }

        let record = RepoRecord::new(name, address, user_name.map(str::to_string));
        Ok((record, Credentials::from_parts(user_name, password)))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
