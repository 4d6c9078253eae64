use std::error::Error;
use std::time::Duration;

use scrapbox_socket::socket::error::ResultEnvelope;
use scrapbox_socket::socket::proto::{Change, CommitData, JoinRoomData};
use scrapbox_socket::transport::memory::MemoryTransport;
use scrapbox_socket::Socket;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let project_id = "REPLACE_WITH_PROJECT_ID".to_string();
    let page_id = "REPLACE_WITH_PAGE_ID".to_string();
    let parent_id = "REPLACE_WITH_LATEST_COMMIT_ID".to_string();
    let user_id = "REPLACE_WITH_USER_ID".to_string();

    // Stands in for a Socket.IO client: answers every request immediately.
    let transport = MemoryTransport::new().with_responder(|_, payload| match payload["method"].as_str() {
        Some("room:join") => Some(json!({
            "data": {
                "success": true,
                "pageId": payload["data"]["pageId"],
                "projectId": payload["data"]["projectId"],
            }
        })),
        Some("commit") => Some(json!({ "data": { "commitId": "REPLACE_WITH_COMMIT_ID" } })),
        _ => Some(json!({ "error": { "name": "UnknownMethodError" } })),
    });

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let socket = Socket::new(transport).with_request_timeout(Duration::from_secs(10));

        let joined = socket
            .join_room(JoinRoomData::page(&project_id, &page_id))
            .await?;
        println!("joined project={} page={:?}", joined.project_id, joined.page_id);

        let commit = CommitData::page(
            &project_id,
            &page_id,
            &parent_id,
            &user_id,
            vec![Change::insert("_end", "REPLACE_WITH_LINE_ID", "hello from rust")],
        );
        let result = socket.commit(commit).await;
        println!("{}", serde_json::to_string_pretty(&ResultEnvelope(&result))?);

        Ok::<(), Box<dyn Error>>(())
    })?;

    Ok(())
}
