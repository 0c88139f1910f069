use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use super::meta::StoreError;
use super::models::UserAccount;

/// Account store: one JSON document per user under the users directory,
/// addressed by username. Same atomic write discipline as the track store.
#[derive(Clone)]
pub struct UserStore {
    dir: PathBuf,
}

/// Usernames double as file names; anything that could escape the users
/// directory is treated as nonexistent.
fn valid_username(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}

impl UserStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub async fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn account_path(&self, username: &str) -> PathBuf {
        self.dir.join(format!("{username}.json"))
    }

    /// Load an account by username.
    pub async fn get(&self, username: &str) -> Result<UserAccount, StoreError> {
        if !valid_username(username) {
            return Err(StoreError::NotFound(username.to_string()));
        }
        let data = tokio::fs::read(self.account_path(username))
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    StoreError::NotFound(username.to_string())
                } else {
                    StoreError::Io(e)
                }
            })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Create or replace an account document.
    pub async fn put(&self, account: &UserAccount) -> Result<(), StoreError> {
        debug_assert!(
            valid_username(&account.username),
            "username must be a plain file-name-safe token"
        );

        let data = serde_json::to_vec_pretty(account)?;
        let tmp = self.dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(&data).await?;
            file.flush().await?;
            file.sync_all().await?;
            tokio::fs::rename(&tmp, self.account_path(&account.username)).await?;
            Ok(())
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }

    /// All accounts on disk. Accounts removed mid-scan are skipped.
    pub async fn list(&self) -> Result<Vec<UserAccount>, StoreError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(username) = name.strip_suffix(".json") {
                if valid_username(username) {
                    names.push(username.to_string());
                }
            }
        }

        let mut accounts = Vec::with_capacity(names.len());
        for username in names {
            match self.get(&username).await {
                Ok(account) => accounts.push(account),
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(accounts)
    }
}
