use super::SessionHandle;
use crate::event::Event;

use futures::stream;
use std::convert::Infallible;
use std::time::Duration;
use warp::reply::Reply;
use warp::sse::Event as SseEvent;

/// Drains a stream session into a Server-Sent-Events response.
pub struct Sse;

impl Sse {
    fn reply_with(event: &Event) -> SseEvent {
        SseEvent::default()
            .event(event.kind.stream_name())
            .data(event.payload.0.as_str())
    }

    /// The reply owns the handle; when the client goes away warp drops the stream, which
    /// drops the handle and closes the session.
    pub fn send_events(session: SessionHandle) -> impl Reply {
        let event_stream = stream::unfold(session, |session| async move {
            let next = session.recv().await;
            next.map(|event| (Ok::<_, Infallible>(Self::reply_with(&event)), session))
        });

        warp::sse::reply(
            warp::sse::keep_alive()
                .interval(Duration::from_secs(30))
                .text("thump".to_string())
                .stream(event_stream),
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::event::{ActorId, EventKind, Id};
    use crate::stream::Hub;
    use std::sync::Arc;

    #[tokio::test]
    async fn buffered_events_are_flushed_before_the_stream_ends() -> Result<(), Box<dyn std::error::Error>> {
        let hub = Hub::new(8);
        let handle = hub.subscribe(Id(1));
        let origin = ActorId::Local(Id(2));
        let events = [
            Event::new(1, EventKind::Create, origin.clone(), "status/1"),
            Event::new(2, EventKind::Delete, origin, "status/1"),
        ];
        for event in events {
            hub.publish(&Arc::new(event), &[Id(1)]);
        }
        handle.disconnect();

        let response = Sse::send_events(handle).into_response();
        let body = warp::hyper::body::to_bytes(response.into_body()).await?;
        let body = String::from_utf8(body.to_vec())?;
        assert_eq!(body, "event:update\ndata:status/1\n\nevent:delete\ndata:status/1\n\n");
        assert_eq!(hub.count(), 0);
        Ok(())
    }
}
