use crate::*;
use flydrop_sys::NativeBuffer;
use serde::{Deserialize, Serialize};

/// Unsolicited events pushed by the native library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiEvent {
    /// Discovery found a peer.
    Discovered(PeerMetadata),

    /// A peer asks us to do something.
    AppControl {
        /// requesting peer
        peer: PeerId,
        /// session id, echo it back in [CmdRequest::Ack]
        sid: u64,
        /// what is being asked
        ctl: ControlContent,
    },

    /// Progress of a request we sent to a peer.
    AppControlUpdate {
        /// the peer we asked
        peer: PeerId,
        /// where it stands
        status: ControlStatus,
    },
}

tagged_union!(ApiEvent {
    Discovered,
    AppControl,
    AppControlUpdate,
});

/// The body of an [ApiEvent::AppControl].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlContent {
    /// Open a uri locally.
    LaunchUri {
        /// the uri
        uri: String,
        /// whether the user should confirm first
        ask: bool,
    },
}

tagged_union!(ControlContent { LaunchUri });

/// Remote status of a control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlStatus {
    /// Waiting on the remote user.
    Waiting,
    /// Done.
    Success,
    /// Refused.
    Cancelled,
    /// Went wrong remotely.
    Failed,
}

/// Receiver of decoded [ApiEvent]s.
///
/// Called on the native library's thread, in the order the native side
/// raised the events. Nothing is buffered: a slow sink holds up the next
/// event, so offload anything heavy.
pub trait EventSink: 'static + Send + Sync {
    /// Handle one event.
    fn on_event(&self, evt: ApiEvent);
}

impl<F> EventSink for F
where
    F: Fn(ApiEvent) + 'static + Send + Sync,
{
    fn on_event(&self, evt: ApiEvent) {
        self(evt)
    }
}

/// Decode one native event buffer and hand it to the sink.
/// Undecodable events are logged and dropped.
pub(crate) fn dispatch(sink: &dyn EventSink, buf: NativeBuffer<'_>) {
    match codec::decode_union::<ApiEvent>(buf.as_bytes()) {
        Ok(evt) => {
            tracing::trace!(tag = evt.tag(), "event");
            sink.on_event(evt);
        }
        Err(err) => {
            tracing::warn!(
                %err,
                raw = %String::from_utf8_lossy(buf.as_bytes()),
                "dropping undecodable event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    const DISCOVERED: &str = r#"{"Discovered":{"name":"desk","id":"p1","typ":"LinuxDevice","addr":"192.168.1.2:4000"}}"#;
    const APP_CONTROL: &str = r#"{"AppControl":{"peer":"p1","sid":9,"ctl":{"LaunchUri":{"uri":"https://example.com","ask":true}}}}"#;
    const APP_CONTROL_UPDATE: &str = r#"{"AppControlUpdate":{"peer":"p1","status":"Cancelled"}}"#;

    fn collect() -> (Arc<Mutex<Vec<ApiEvent>>>, impl EventSink) {
        let got = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let got = got.clone();
            move |evt: ApiEvent| got.lock().push(evt)
        };
        (got, sink)
    }

    #[test]
    fn each_event_kind() {
        let (got, sink) = collect();
        for json in [DISCOVERED, APP_CONTROL_UPDATE, APP_CONTROL] {
            dispatch(&sink, NativeBuffer::from_slice(json.as_bytes()));
        }

        let got = got.lock();
        assert_eq!(3, got.len());
        match &got[0] {
            ApiEvent::Discovered(meta) => {
                assert_eq!("desk", meta.name);
                assert_eq!(Some(4000), meta.address.port);
            }
            oth => panic!("unexpected {:?}", oth),
        }
        assert_eq!(
            ApiEvent::AppControlUpdate {
                peer: "p1".into(),
                status: ControlStatus::Cancelled,
            },
            got[1],
        );
        assert_eq!(
            ApiEvent::AppControl {
                peer: "p1".into(),
                sid: 9,
                ctl: ControlContent::LaunchUri {
                    uri: "https://example.com".into(),
                    ask: true,
                },
            },
            got[2],
        );
    }

    #[test]
    fn bad_events_do_not_disrupt_delivery() {
        let (got, sink) = collect();
        for json in [
            r#"{"Exploded":{}}"#,
            DISCOVERED,
            "not json",
            r#"{"AppControl":{"peer":"p1","sid":1,"ctl":{"Reboot":{}}}}"#,
            r#"{"AppControlUpdate":{"peer":"p1","status":"Maybe"}}"#,
            APP_CONTROL_UPDATE,
        ] {
            dispatch(&sink, NativeBuffer::from_slice(json.as_bytes()));
        }
        let got = got.lock();
        assert_eq!(2, got.len());
        assert_eq!("Discovered", got[0].tag());
        assert_eq!("AppControlUpdate", got[1].tag());
    }

    #[test]
    fn unknown_control_tag_is_a_payload_error() {
        let res = codec::decode_union::<ApiEvent>(
            br#"{"AppControl":{"peer":"p1","sid":1,"ctl":{"Reboot":{}}}}"#,
        );
        assert!(matches!(
            res,
            Err(codec::DecodeError::Payload { tag, .. }) if tag == "AppControl"
        ));
        assert!(matches!(
            codec::decode_union::<ControlContent>(br#"{"Reboot":{}}"#),
            Err(codec::DecodeError::UnknownTag { .. })
        ));
    }

    #[test]
    fn tags_cover_every_variant() {
        let tags: Vec<_> = [DISCOVERED, APP_CONTROL, APP_CONTROL_UPDATE]
            .iter()
            .map(|json| {
                codec::decode_union::<ApiEvent>(json.as_bytes())
                    .unwrap()
                    .tag()
            })
            .collect();
        assert_eq!(ApiEvent::TAGS, &tags[..]);
    }
}
