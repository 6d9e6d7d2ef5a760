use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a repository record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoId(pub u64);

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Repository lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepoState {
    /// Accepted but not cloned yet
    New,
    /// A pull or checkout is running (or was interrupted by a restart)
    Busy,
    /// Cloned and ready
    Local,
    /// Clone failed, see the record's error message
    Error,
}

impl RepoState {
    /// Whether a git operation owns the working directory right now
    pub fn is_pending(self) -> bool {
        matches!(self, RepoState::New | RepoState::Busy)
    }
}

impl std::fmt::Display for RepoState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RepoState::New => "new",
            RepoState::Busy => "busy",
            RepoState::Local => "local",
            RepoState::Error => "error",
        };
        f.write_str(label)
    }
}

/// A known repository and its lifecycle state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoRecord {
    /// Assigned by the record store on creation
    #[serde(default)]
    pub id: Option<RepoId>,
    pub folder: String,
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub size: u64,
    pub state: RepoState,
    #[serde(default)]
    pub error: String,
}

impl RepoRecord {
    /// A fresh record in `New`, with its folder derived from the name
    pub fn new(name: impl Into<String>, address: impl Into<String>, user_name: Option<String>) -> Self {
        let name = name.into();
        Self {
            id: None,
            folder: folder_name(&name),
            name,
            address: address.into(),
            user_name,
            size: 0,
            state: RepoState::New,
            error: String::new(),
        }
    }

    /// Transition to `Local`, clearing any previous failure
    pub fn mark_local(&mut self, size: Option<u64>) {
        if let Some(size) = size {
            self.size = size;
        }
        self.state = RepoState::Local;
        self.error.clear();
    }

    /// Transition to `Error` with a user facing message
    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.state = RepoState::Error;
        self.error = message.into();
    }
}

impl std::fmt::Display for RepoRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// On-disk directory name for a repository display name.
///
/// Deterministic 31-multiplier hash over the UTF-16 code units of the name,
/// rendered as the decimal absolute value. Two names may collide; the record
/// store rejects the second one.
pub fn folder_name(name: &str) -> String {
    let mut hash: i32 = 0;
    for unit in name.encode_utf16() {
        hash = hash.wrapping_mul(31).wrapping_add(i32::from(unit));
    }
    hash.unsigned_abs().to_string()
}

/// Username/password pair for a single clone or pull.
///
/// Lives in memory for the duration of one operation and is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user_name: String,
    pub password: String,
}

impl Credentials {
    /// Both parts are required; either one missing means anonymous access
    pub fn from_parts(user_name: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (user_name, password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => Some(Self {
                user_name: user.to_string(),
                password: pass.to_string(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_name", &self.user_name)
            .field("password", &"<redacted>")
            .finish()
    }
}
