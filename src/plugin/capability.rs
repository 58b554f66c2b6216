//! Plugin capabilities.
//!
//! A capability is a named permission a plugin must declare in its manifest
//! before the corresponding host operation will serve it. The check happens
//! at call time and a denial is always logged with the offending plugin id,
//! so the boundary stays auditable.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// Write bytes into a session's input stream.
    #[serde(rename = "pty:write")]
    PtyWrite,
    /// Open a markdown content panel.
    #[serde(rename = "ui:markdown")]
    UiMarkdown,
    /// Play the notification sound.
    #[serde(rename = "ui:sound")]
    UiSound,
    /// Open a free-form HTML panel.
    #[serde(rename = "ui:panel")]
    UiPanel,
    /// Outbound HTTP, restricted to the manifest's URL allow-list.
    #[serde(rename = "net:http")]
    NetHttp,
    /// Read files inside the manifest's path allow-list.
    #[serde(rename = "fs:read")]
    FsRead,
    /// List directories inside the manifest's path allow-list.
    #[serde(rename = "fs:list")]
    FsList,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::PtyWrite => "pty:write",
            Capability::UiMarkdown => "ui:markdown",
            Capability::UiSound => "ui:sound",
            Capability::UiPanel => "ui:panel",
            Capability::NetHttp => "net:http",
            Capability::FsRead => "fs:read",
            Capability::FsList => "fs:list",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
