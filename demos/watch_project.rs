use std::error::Error;

use futures_util::StreamExt;
use scrapbox_socket::socket::proto::{ProjectUpdatesEvent, ProjectUpdatesEventKind};
use scrapbox_socket::transport::memory::MemoryTransport;
use scrapbox_socket::Socket;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let project_id = "REPLACE_WITH_PROJECT_ID".to_string();
    let transport = MemoryTransport::new();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let socket = Socket::new(transport.clone());
        let mut events = socket.response::<ProjectUpdatesEvent>();

        // Replays two server pushes once the stream is listening.
        let remote = transport.clone();
        let project = project_id.clone();
        tokio::spawn(async move {
            for (index, kind) in ["member.join", "invitation.reset"].into_iter().enumerate() {
                while remote.listener_count("projectUpdatesStream:event") == 0 {
                    tokio::task::yield_now().await;
                }
                remote.dispatch(
                    "projectUpdatesStream:event",
                    json!({
                        "id": format!("event-{index}"),
                        "pageId": "REPLACE_WITH_PAGE_ID",
                        "userId": "REPLACE_WITH_USER_ID",
                        "projectId": project,
                        "created": 0,
                        "updated": 0,
                        "type": kind,
                    }),
                );
                tokio::task::yield_now().await;
            }
        });

        while let Some(event) = events.next().await {
            println!("project={} event={} kind={:?}", event.project_id, event.id, event.kind);
            if matches!(event.kind, ProjectUpdatesEventKind::InvitationReset) {
                break;
            }
        }

        Ok::<(), Box<dyn Error>>(())
    })?;

    Ok(())
}
