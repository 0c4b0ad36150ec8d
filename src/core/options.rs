//! Request options for the keys API and their mapping onto query strings and
//! form bodies.

use crate::errors::EtcdError;

pub(crate) type Params = Vec<(&'static str, String)>;

fn push_flag(params: &mut Params, name: &'static str, on: bool) {
    if on {
        params.push((name, "true".to_string()));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub recursive: bool,
    pub sorted: bool,
    /// Route the read through the raft log instead of the local member.
    pub quorum: bool,
}

impl GetOptions {
    #[must_use]
    pub fn recursive() -> Self {
        Self {
            recursive: true,
            ..Self::default()
        }
    }

    pub(crate) fn query(&self) -> Params {
        let mut q = Params::new();
        push_flag(&mut q, "recursive", self.recursive);
        push_flag(&mut q, "sorted", self.sorted);
        push_flag(&mut q, "quorum", self.quorum);
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Time to live in seconds.
    pub ttl: Option<u64>,
    pub prev_exist: Option<bool>,
    pub prev_value: Option<String>,
    pub prev_index: Option<u64>,
    pub dir: bool,
    /// Reset the TTL without notifying watchers; must not carry a value.
    pub refresh: bool,
}

impl SetOptions {
    #[must_use]
    pub fn with_ttl(ttl: u64) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self, value: Option<&str>) -> Result<(), EtcdError> {
        if self.refresh {
            if self.ttl.is_none() {
                return Err(EtcdError::InvalidRequest(
                    "refresh requires a ttl".to_string(),
                ));
            }
            if value.is_some() {
                return Err(EtcdError::InvalidRequest(
                    "refresh must not carry a value".to_string(),
                ));
            }
        }
        if self.dir && value.is_some() {
            return Err(EtcdError::InvalidRequest(
                "a directory cannot hold a value".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn query(&self) -> Params {
        let mut q = Params::new();
        if let Some(exist) = self.prev_exist {
            q.push(("prevExist", exist.to_string()));
        }
        if let Some(prev) = &self.prev_value {
            q.push(("prevValue", prev.clone()));
        }
        if let Some(index) = self.prev_index {
            q.push(("prevIndex", index.to_string()));
        }
        q
    }

    pub(crate) fn form(&self, value: Option<&str>) -> Params {
        let mut f = Params::new();
        if let Some(value) = value {
            f.push(("value", value.to_string()));
        }
        if let Some(ttl) = self.ttl {
            f.push(("ttl", ttl.to_string()));
        }
        push_flag(&mut f, "dir", self.dir);
        push_flag(&mut f, "refresh", self.refresh);
        f
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub recursive: bool,
    pub dir: bool,
    pub prev_value: Option<String>,
    pub prev_index: Option<u64>,
}

impl DeleteOptions {
    pub(crate) fn query(&self) -> Params {
        let mut q = Params::new();
        push_flag(&mut q, "recursive", self.recursive);
        push_flag(&mut q, "dir", self.dir);
        if let Some(prev) = &self.prev_value {
            q.push(("prevValue", prev.clone()));
        }
        if let Some(index) = self.prev_index {
            q.push(("prevIndex", index.to_string()));
        }
        q
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// First index to report; `None` waits for the next change.
    pub wait_index: Option<u64>,
    pub recursive: bool,
}

impl WatchOptions {
    #[must_use]
    pub fn from_index(index: u64) -> Self {
        Self {
            wait_index: Some(index),
            ..Self::default()
        }
    }

    pub(crate) fn query(&self) -> Params {
        let mut q = vec![("wait", "true".to_string())];
        if let Some(index) = self.wait_index {
            q.push(("waitIndex", index.to_string()));
        }
        push_flag(&mut q, "recursive", self.recursive);
        q
    }
}
