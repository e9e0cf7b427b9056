use std::{io::ErrorKind, path::PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::users::repo_types::{PublicUser, Role, Snapshot, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("data file {0} does not exist")]
    Unavailable(PathBuf),
    #[error("data file i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("data file is not valid: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Flat-file user store.
///
/// Every operation parses the whole snapshot and every mutation rewrites it.
/// The lock only serializes access within this process; another process
/// writing the same file can still lose updates.
pub struct UserStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl UserStore {
    /// Opens a store over an existing snapshot. The store never creates the file.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if !tokio::fs::try_exists(&path).await? {
            return Err(StoreError::Unavailable(path));
        }
        let store = Self {
            path,
            lock: RwLock::new(()),
        };
        // Fail at startup rather than on the first request if the file is unreadable.
        let users = store.read_users().await?;
        info!(path = %store.path.display(), users = users.len(), "user store opened");
        Ok(store)
    }

    pub async fn list_all(&self) -> Result<Vec<User>, StoreError> {
        let _guard = self.lock.read().await;
        self.read_users().await
    }

    pub async fn list_public(&self) -> Result<Vec<PublicUser>, StoreError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .map(PublicUser::from)
            .collect())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.list_all().await?.into_iter().find(|u| u.id == id))
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .find(|u| u.username == username))
    }

    /// Appends a new user. Returns `None` if the username is taken, in which
    /// case nothing is written.
    pub async fn create(
        &self,
        username: &str,
        role: Role,
        password: &str,
    ) -> Result<Option<PublicUser>, StoreError> {
        let _guard = self.lock.write().await;
        let mut users = self.read_users().await?;
        if users.iter().any(|u| u.username == username) {
            debug!(%username, "create rejected: duplicate username");
            return Ok(None);
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            role,
            password: password.to_string(),
        };
        users.push(user.clone());
        self.write_users(users).await?;

        info!(user_id = %user.id, username = %user.username, role = %user.role, "user created");
        Ok(Some(user.into()))
    }

    /// Removes the user with `id`. Returns whether a record was removed.
    pub async fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.write().await;
        let mut users = self.read_users().await?;
        let before = users.len();
        users.retain(|u| u.id != id);
        if users.len() == before {
            return Ok(false);
        }
        self.write_users(users).await?;

        info!(user_id = %id, "user deleted");
        Ok(true)
    }

    async fn read_users(&self) -> Result<Vec<User>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => self.halt_missing(),
            Err(e) => return Err(e.into()),
        };
        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        Ok(snapshot.users)
    }

    async fn write_users(&self, users: Vec<User>) -> Result<(), StoreError> {
        if !tokio::fs::try_exists(&self.path).await? {
            self.halt_missing();
        }
        let bytes = serde_json::to_vec_pretty(&Snapshot { users })?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }

    /// The snapshot vanished under a running process. There is no state to
    /// fall back to, so the process stops.
    fn halt_missing(&self) -> ! {
        error!(
            path = %self.path.display(),
            "data file does not exist; the service can only run while it exists"
        );
        info!("the service never creates the data file; restore it from a backup or version control");
        std::process::exit(1)
    }
}
