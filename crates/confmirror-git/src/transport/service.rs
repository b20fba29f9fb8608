//! Smart-HTTP actions and their endpoints.

use std::fmt;

use git2::transport::Service;
use reqwest::Method;

/// One of the four requests of the git smart-HTTP protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmartAction {
    /// `GET info/refs?service=git-upload-pack`
    UploadPackList,
    /// `POST git-upload-pack`
    UploadPack,
    /// `GET info/refs?service=git-receive-pack`
    ReceivePackList,
    /// `POST git-receive-pack`
    ReceivePack,
}

impl SmartAction {
    /// All actions, list actions first.
    pub const ALL: [SmartAction; 4] = [
        Self::UploadPackList,
        Self::ReceivePackList,
        Self::UploadPack,
        Self::ReceivePack,
    ];

    /// Maps the engine's service request to an action.
    pub fn from_service(service: Service) -> Self {
        match service {
            Service::UploadPackLs => Self::UploadPackList,
            Service::UploadPack => Self::UploadPack,
            Service::ReceivePackLs => Self::ReceivePackList,
            Service::ReceivePack => Self::ReceivePack,
        }
    }

    /// Returns true for the reference advertisement requests.
    pub fn is_list(self) -> bool {
        matches!(self, Self::UploadPackList | Self::ReceivePackList)
    }

    /// Returns the path appended to the repository URL.
    pub fn endpoint_suffix(self) -> &'static str {
        match self {
            Self::UploadPackList => "/info/refs?service=git-upload-pack",
            Self::UploadPack => "/git-upload-pack",
            Self::ReceivePackList => "/info/refs?service=git-receive-pack",
            Self::ReceivePack => "/git-receive-pack",
        }
    }

    /// Returns the full request URL for a repository base URL.
    pub fn endpoint(self, base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), self.endpoint_suffix())
    }

    /// GET for list actions, POST for pack actions.
    pub fn method(self) -> Method {
        if self.is_list() {
            Method::GET
        } else {
            Method::POST
        }
    }

    /// Returns the request content type of the pack actions.
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Self::UploadPack => Some("application/x-git-upload-pack-request"),
            Self::ReceivePack => Some("application/x-git-receive-pack-request"),
            Self::UploadPackList | Self::ReceivePackList => None,
        }
    }

    /// Returns the expected response content type.
    pub fn accept(self) -> &'static str {
        match self {
            Self::UploadPackList => "application/x-git-upload-pack-advertisement",
            Self::UploadPack => "application/x-git-upload-pack-result",
            Self::ReceivePackList => "application/x-git-receive-pack-advertisement",
            Self::ReceivePack => "application/x-git-receive-pack-result",
        }
    }
}

impl fmt::Display for SmartAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UploadPackList => "upload-pack-list",
            Self::UploadPack => "upload-pack",
            Self::ReceivePackList => "receive-pack-list",
            Self::ReceivePack => "receive-pack",
        };
        f.write_str(name)
    }
}
