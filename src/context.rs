use std::path::{Path, PathBuf};

/// Home and working directory of the primary server instance.
///
/// Only the instance launched at port offset 0 publishes a context. It is
/// set when that instance starts and cleared when it stops. Collaborators
/// that need to know where the primary server lives read it from the
/// lifecycle manager instead of from process-wide state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    server_home: PathBuf,
    working_dir: PathBuf,
}

impl ExecutionContext {
    /// Context for a server extracted at `home`; the working directory is the
    /// home itself
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let server_home = home.into();
        Self {
            working_dir: server_home.clone(),
            server_home,
        }
    }

    /// Server home directory
    pub fn server_home(&self) -> &Path {
        &self.server_home
    }

    /// Working directory collaborators should resolve relative paths against
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }
}
