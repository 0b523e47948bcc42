// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>

//! Bucket and scope handles.

use std::sync::Arc;

use crate::client::HttpTransport;
use crate::collection::Collection;

/// Name of the scope and collection every bucket starts with.
pub const DEFAULT_NAME: &str = "_default";

/// An opened bucket.
#[derive(Debug, Clone)]
pub struct Bucket {
    transport: Arc<HttpTransport>,
    name: String,
}

impl Bucket {
    pub(crate) fn new(transport: Arc<HttpTransport>, name: String) -> Self {
        Self { transport, name }
    }

    /// The bucket name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The `_default` scope.
    pub fn default_scope(&self) -> Scope {
        self.scope(DEFAULT_NAME)
    }

    /// A named scope of this bucket.
    pub fn scope(&self, name: impl Into<String>) -> Scope {
        Scope {
            transport: Arc::clone(&self.transport),
            bucket: self.name.clone(),
            name: name.into(),
        }
    }

    /// The `_default` collection of the `_default` scope.
    pub fn default_collection(&self) -> Collection {
        self.default_scope().collection(DEFAULT_NAME)
    }

    /// A named collection in the `_default` scope.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        self.default_scope().collection(name)
    }
}

/// A scope within a bucket.
#[derive(Debug, Clone)]
pub struct Scope {
    transport: Arc<HttpTransport>,
    bucket: String,
    name: String,
}

impl Scope {
    /// The scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the bucket this scope belongs to.
    pub fn bucket_name(&self) -> &str {
        &self.bucket
    }

    /// A named collection in this scope.
    pub fn collection(&self, name: impl Into<String>) -> Collection {
        Collection::new(
            Arc::clone(&self.transport),
            self.bucket.clone(),
            self.name.clone(),
            name.into(),
        )
    }
}
