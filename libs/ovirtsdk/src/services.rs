//! Resource service tree rooted at [`SystemService`].
//!
//! Services are thin, cloneable handles pairing a [`Connection`] with a path.
//! Bodies are raw bytes in the connection's media type; decoding them into
//! typed models is left to the caller.

use crate::connection::Connection;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};

const ALL_CONTENT: HeaderName = HeaderName::from_static("all-content");

/// Options for listing a collection.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Engine search expression, e.g. `name=web* and status=up`.
    pub search: Option<String>,
    pub max: Option<u32>,
    /// Links to inline, e.g. `disk_attachments,nics`.
    pub follow: Option<String>,
    pub case_sensitive: Option<bool>,
    /// Return every attribute, including the expensive ones.
    pub all_content: bool,
}

/// Options for fetching a single entity.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    pub follow: Option<String>,
    pub all_content: bool,
}

fn with_all_content(request: Request, all_content: bool) -> Request {
    if all_content {
        request.header(ALL_CONTENT, HeaderValue::from_static("true"))
    } else {
        request
    }
}

impl ListOptions {
    fn apply(&self, mut request: Request) -> Request {
        if let Some(search) = &self.search {
            request = request.query("search", search);
        }
        if let Some(case_sensitive) = self.case_sensitive {
            request = request.query("case_sensitive", case_sensitive.to_string());
        }
        if let Some(max) = self.max {
            request = request.query("max", max.to_string());
        }
        if let Some(follow) = &self.follow {
            request = request.query("follow", follow);
        }
        with_all_content(request, self.all_content)
    }
}

impl GetOptions {
    fn apply(&self, mut request: Request) -> Request {
        if let Some(follow) = &self.follow {
            request = request.query("follow", follow);
        }
        with_all_content(request, self.all_content)
    }
}

fn join(parent: &str, child: &str) -> String {
    let child = child.trim_matches('/');
    if parent.is_empty() {
        child.to_owned()
    } else {
        format!("{parent}/{child}")
    }
}

/// Root of the API (`/ovirt-engine/api`).
#[derive(Debug, Clone)]
pub struct SystemService {
    connection: Connection,
}

impl SystemService {
    pub(crate) fn new(connection: Connection) -> Self {
        Self { connection }
    }

    /// Product information and summary counters.
    ///
    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn get(&self) -> Result<Response, Error> {
        self.connection.send(&Request::get("")).await
    }

    /// Service for an arbitrary path below the root.
    #[must_use]
    pub fn service(&self, path: &str) -> EntityService {
        EntityService::new(self.connection.clone(), path.trim_matches('/'))
    }
}

macro_rules! collection_locators {
    ($($(#[$doc:meta])* $name:ident => $path:literal),* $(,)?) => {
        impl SystemService {
            $(
                $(#[$doc])*
                #[must_use]
                pub fn $name(&self) -> CollectionService {
                    CollectionService::new(self.connection.clone(), $path)
                }
            )*
        }
    };
}

collection_locators! {
    /// Virtual machines.
    vms => "vms",
    hosts => "hosts",
    clusters => "clusters",
    data_centers => "datacenters",
    storage_domains => "storagedomains",
    templates => "templates",
    /// Logical networks.
    networks => "networks",
    disks => "disks",
    users => "users",
    /// Audit log.
    events => "events",
}

/// A collection such as `vms` or `vms/123/nics`.
#[derive(Debug, Clone)]
pub struct CollectionService {
    connection: Connection,
    path: String,
}

impl CollectionService {
    pub(crate) fn new(connection: Connection, path: impl Into<String>) -> Self {
        Self {
            connection,
            path: path.into(),
        }
    }

    /// Path relative to the API root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn list(&self, options: &ListOptions) -> Result<Response, Error> {
        let request = options.apply(Request::get(self.path.as_str()));
        self.connection.send(&request).await
    }

    /// Create a member from a serialized representation.
    ///
    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn add(&self, body: impl Into<Bytes>) -> Result<Response, Error> {
        self.connection
            .send(&Request::post(self.path.as_str()).body(body))
            .await
    }

    #[must_use]
    pub fn entity(&self, id: &str) -> EntityService {
        EntityService::new(self.connection.clone(), join(&self.path, id))
    }
}

/// A single resource such as `vms/123`.
#[derive(Debug, Clone)]
pub struct EntityService {
    connection: Connection,
    path: String,
}

impl EntityService {
    pub(crate) fn new(connection: Connection, path: impl Into<String>) -> Self {
        Self {
            connection,
            path: path.into(),
        }
    }

    /// Path relative to the API root.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn get(&self, options: &GetOptions) -> Result<Response, Error> {
        let request = options.apply(Request::get(self.path.as_str()));
        self.connection.send(&request).await
    }

    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn update(&self, body: impl Into<Bytes>) -> Result<Response, Error> {
        self.connection
            .send(&Request::put(self.path.as_str()).body(body))
            .await
    }

    /// # Errors
    /// Whatever [`Connection::send`] returns.
    pub async fn remove(&self) -> Result<Response, Error> {
        self.connection
            .send(&Request::delete(self.path.as_str()))
            .await
    }

    /// Invoke an action such as `start` or `shutdown`.
    ///
    /// # Errors
    /// Whatever [`Connection::send`] returns. A failed action comes back as
    /// [`Error::Fault`] decoded from the `<action><fault>` envelope.
    pub async fn action(&self, name: &str, body: impl Into<Bytes>) -> Result<Response, Error> {
        self.connection
            .send(&Request::post(join(&self.path, name)).body(body))
            .await
    }

    /// Sub-collection such as `nics` or `diskattachments`.
    #[must_use]
    pub fn collection(&self, name: &str) -> CollectionService {
        CollectionService::new(self.connection.clone(), join(&self.path, name))
    }
}
