//! Message schemas exchanged over the Scrapbox socket.
//!
//! These are pass-through payload shapes. The adapter only looks at the
//! `data`/`error` envelope of acknowledgements; everything here exists so
//! callers can build and read payloads with types instead of raw JSON.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request event carrying page commits and room joins.
pub const SOCKET_IO_REQUEST_EVENT: &str = "socket.io-request";
/// Cursor position updates, both emitted and pushed.
pub const CURSOR_EVENT: &str = "cursor";
/// Commit notifications for the joined page.
pub const COMMIT_EVENT: &str = "commit";
/// Commits across a project joined with `projectUpdatesStream`.
pub const PROJECT_UPDATES_COMMIT_EVENT: &str = "projectUpdatesStream:commit";
/// Membership and page lifecycle events across a project.
pub const PROJECT_UPDATES_EVENT_EVENT: &str = "projectUpdatesStream:event";

/// Event that is emitted and answered through an acknowledgement.
pub trait RequestEvent {
    /// Wire event name.
    const NAME: &'static str;
    /// Whether the acknowledgement must carry a `data` field.
    const HAS_RESPONSE_DATA: bool = true;
    /// Payload sent with the event.
    type Data: Serialize;
    /// Decoded `data` field of a successful acknowledgement.
    type Response: DeserializeOwned;
}

/// Event pushed by the server without being requested.
pub trait ListenEvent {
    /// Wire event name.
    const NAME: &'static str;
    /// Decoded event payload.
    type Data: DeserializeOwned;
}

/// `socket.io-request`: commits and room joins.
#[derive(Clone, Copy, Debug)]
pub struct SocketIoRequest;

impl RequestEvent for SocketIoRequest {
    const NAME: &'static str = SOCKET_IO_REQUEST_EVENT;
    type Data = SocketIoRequestData;
    type Response = SocketIoResponse;
}

/// `cursor`: emitted to move the local cursor, pushed for remote cursors.
#[derive(Clone, Copy, Debug)]
pub struct Cursor;

impl RequestEvent for Cursor {
    const NAME: &'static str = CURSOR_EVENT;
    const HAS_RESPONSE_DATA: bool = false;
    type Data = MoveCursorRequest;
    type Response = ();
}

impl ListenEvent for Cursor {
    const NAME: &'static str = CURSOR_EVENT;
    type Data = MoveCursorData;
}

/// `commit`: a commit landed on the joined page.
#[derive(Clone, Copy, Debug)]
pub struct Commit;

impl ListenEvent for Commit {
    const NAME: &'static str = COMMIT_EVENT;
    type Data = CommitNotification;
}

/// `projectUpdatesStream:commit`.
#[derive(Clone, Copy, Debug)]
pub struct ProjectUpdatesCommit;

impl ListenEvent for ProjectUpdatesCommit {
    const NAME: &'static str = PROJECT_UPDATES_COMMIT_EVENT;
    type Data = ProjectUpdatesStreamCommit;
}

/// `projectUpdatesStream:event`.
#[derive(Clone, Copy, Debug)]
pub struct ProjectUpdatesEvent;

impl ListenEvent for ProjectUpdatesEvent {
    const NAME: &'static str = PROJECT_UPDATES_EVENT_EVENT;
    type Data = ProjectUpdatesStreamEvent;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", content = "data")]
pub enum SocketIoRequestData {
    #[serde(rename = "commit")]
    Commit(CommitData),
    #[serde(rename = "room:join")]
    JoinRoom(JoinRoomData),
}

/// `data` of a successful `socket.io-request` acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum SocketIoResponse {
    Commit(CommitResponseData),
    JoinRoom(JoinRoomResponseData),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomData {
    pub page_id: Option<String>,
    pub project_id: String,
    pub project_updates_stream: bool,
}

impl JoinRoomData {
    /// Joins the room of a single page.
    pub fn page(project_id: impl Into<String>, page_id: impl Into<String>) -> Self {
        Self {
            page_id: Some(page_id.into()),
            project_id: project_id.into(),
            project_updates_stream: false,
        }
    }

    /// Joins the project room without selecting a page.
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            page_id: None,
            project_id: project_id.into(),
            project_updates_stream: false,
        }
    }

    /// Subscribes to the project-wide updates stream.
    pub fn project_updates(project_id: impl Into<String>) -> Self {
        Self {
            page_id: None,
            project_id: project_id.into(),
            project_updates_stream: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoomResponseData {
    pub success: bool,
    pub page_id: Option<String>,
    pub project_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponseData {
    pub commit_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CommitKind {
    #[default]
    Page,
}

/// Commit body sent through `socket.io-request`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CommitData {
    pub kind: CommitKind,
    pub parent_id: String,
    pub project_id: String,
    pub page_id: String,
    pub user_id: String,
    pub changes: Vec<Change>,
    pub cursor: Option<Value>,
    pub freeze: bool,
}

impl CommitData {
    /// Builds a page commit on top of `parent_id`.
    pub fn page(
        project_id: impl Into<String>,
        page_id: impl Into<String>,
        parent_id: impl Into<String>,
        user_id: impl Into<String>,
        changes: Vec<Change>,
    ) -> Self {
        Self {
            kind: CommitKind::Page,
            parent_id: parent_id.into(),
            project_id: project_id.into(),
            page_id: page_id.into(),
            user_id: user_id.into(),
            changes,
            cursor: None,
            freeze: true,
        }
    }
}

/// Commit pushed on `commit`: the committed body plus its id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitNotification {
    pub id: String,
    #[serde(flatten)]
    pub commit: CommitData,
}

/// Commit pushed on `projectUpdatesStream:commit`. Same shape as
/// [`CommitNotification`].
pub type ProjectUpdatesStreamCommit = CommitNotification;

/// One change inside a commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Change {
    Insert {
        #[serde(rename = "_insert")]
        insert: String,
        lines: InsertedLine,
    },
    Update {
        #[serde(rename = "_update")]
        update: String,
        lines: UpdatedLine,
    },
    Delete {
        #[serde(rename = "_delete")]
        delete: String,
        /// Always `-1` on the wire.
        lines: i64,
    },
    Links {
        links: Vec<String>,
    },
    ProjectLinks {
        #[serde(rename = "projectLinks")]
        project_links: Vec<String>,
    },
    Descriptions {
        descriptions: Vec<String>,
    },
    Title {
        title: String,
    },
    Pin {
        pin: i64,
    },
    Deleted {
        deleted: bool,
    },
    // Last: a missing `image` field decodes as `None`, so this matches any object.
    Image {
        image: Option<String>,
    },
}

impl Change {
    /// Inserts a new line before the line with id `before` (`"_end"` appends).
    pub fn insert(before: impl Into<String>, id: impl Into<String>, text: impl Into<String>) -> Self {
        Change::Insert {
            insert: before.into(),
            lines: InsertedLine {
                id: id.into(),
                text: text.into(),
            },
        }
    }

    /// Replaces the text of the line with id `line_id`.
    pub fn update(line_id: impl Into<String>, text: impl Into<String>) -> Self {
        Change::Update {
            update: line_id.into(),
            lines: UpdatedLine { text: text.into() },
        }
    }

    /// Removes the line with id `line_id`.
    pub fn delete(line_id: impl Into<String>) -> Self {
        Change::Delete {
            delete: line_id.into(),
            lines: -1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InsertedLine {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdatedLine {
    pub text: String,
}

/// Event pushed on `projectUpdatesStream:event`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectUpdatesStreamEvent {
    pub id: String,
    pub page_id: String,
    pub user_id: String,
    pub project_id: String,
    pub created: i64,
    pub updated: i64,
    #[serde(flatten)]
    pub kind: ProjectUpdatesEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ProjectUpdatesEventKind {
    #[serde(rename = "member.join")]
    MemberJoin,
    #[serde(rename = "invitation.reset")]
    InvitationReset,
    #[serde(rename = "page.delete")]
    PageDelete { data: PageDeleteData },
    #[serde(rename = "admin.add", rename_all = "camelCase")]
    AdminAdd { target_user_id: String },
    #[serde(rename = "admin.delete", rename_all = "camelCase")]
    AdminDelete { target_user_id: String },
    #[serde(rename = "owner.set", rename_all = "camelCase")]
    OwnerSet { target_user_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PageDeleteData {
    pub title_lc: String,
}

/// Remote cursor pushed on `cursor`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveCursorData {
    pub user: CursorUser,
    pub page_id: String,
    pub position: CursorPosition,
    pub visible: bool,
    pub socket_id: String,
}

/// Local cursor emitted on `cursor`; the server fills in the socket id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MoveCursorRequest {
    pub user: CursorUser,
    pub page_id: String,
    pub position: CursorPosition,
    pub visible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CursorUser {
    pub id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CursorPosition {
    pub line: u32,
    #[serde(rename = "char")]
    pub column: u32,
}
