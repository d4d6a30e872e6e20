use crate::*;
use flydrop_sys::{EventCb, NativeBuffer, ReadyCb, ResultCb};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a [Bridge].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Constructed, [Bridge::initialize] not called yet.
    Uninitialized,
    /// Waiting for the native ready callback.
    Initializing,
    /// Accepting queries and commands.
    Ready,
    /// Shut down, terminal.
    Disposed,
}

/// Typed async front end to the native library.
///
/// Cheap to clone; every clone talks to the same session. Once
/// [Bridge::initialize] has returned, the bridge is the session handle.
#[derive(Clone)]
pub struct Bridge(Arc<Inner>);

struct Inner {
    adapter: Adapter,
    state: Mutex<State>,
    ready_timeout: Option<Duration>,
}

impl Inner {
    fn mark_ready(&self) {
        let mut state = self.state.lock();
        if *state == State::Initializing {
            *state = State::Ready;
            tracing::info!("native library ready");
        }
    }

    fn reset_initializing(&self) {
        let mut state = self.state.lock();
        if *state == State::Initializing {
            *state = State::Uninitialized;
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .field("adapter", &self.0.adapter)
            .finish()
    }
}

impl Bridge {
    /// Wrap `native`, taking this process's lock.
    ///
    /// Fails with [Error::InitializationFailure] if another bridge in
    /// this process already holds the lock.
    pub fn new<N: Native>(native: N, config: BridgeConfig) -> Result<Self> {
        let adapter = Adapter::new(native, &config.lock_name())?;
        Ok(Self(Arc::new(Inner {
            adapter,
            state: Mutex::new(State::Uninitialized),
            ready_timeout: config.ready_timeout(),
        })))
    }

    /// Load the native library at `path` and wrap it.
    pub fn load<P: AsRef<Path>>(
        path: P,
        config: BridgeConfig,
    ) -> Result<Self> {
        let api = flydrop_sys::load(path)?;
        Self::new(api, config)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        *self.0.state.lock()
    }

    /// Start the native library and wait for it to report ready.
    ///
    /// Events are decoded and handed to `sink` from then on. The wait is
    /// bounded by [BridgeConfig::ready_timeout_ms] if set. The ready
    /// callback itself moves the bridge to [State::Ready], so a caller
    /// that times out or drops this future can still use the bridge
    /// once the native side catches up.
    pub async fn initialize<S: EventSink>(
        &self,
        data_dir: &Path,
        sink: S,
    ) -> Result<()> {
        {
            let mut state = self.0.state.lock();
            match *state {
                State::Uninitialized => *state = State::Initializing,
                oth => {
                    return Err(Error::InitializationFailure(format!(
                        "cannot initialize a bridge in state {:?}",
                        oth
                    )))
                }
            }
        }

        let (ready, pending) = slot::slot::<()>();
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        let on_event: EventCb = Box::new(move |buf: NativeBuffer<'_>| {
            evt::dispatch(&*sink, buf)
        });
        let inner = Arc::downgrade(&self.0);
        let on_ready: ReadyCb = Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.mark_ready();
            }
            ready.resolve(());
        });

        if let Err(err) = self.0.adapter.init(data_dir, on_event, on_ready) {
            self.0.reset_initializing();
            return Err(match err {
                Error::InitializationFailure(_) => err,
                oth => Error::InitializationFailure(oth.to_string()),
            });
        }

        let waited = match self.0.ready_timeout {
            Some(limit) => match tokio::time::timeout(limit, pending).await {
                Ok(waited) => waited,
                Err(_) => {
                    tracing::warn!(?limit, "native library not ready yet");
                    return Err(Error::InitializationFailure(format!(
                        "native library not ready after {:?}",
                        limit
                    )));
                }
            },
            None => pending.await,
        };

        if waited.is_err() {
            self.0.reset_initializing();
            return Err(Error::InitializationFailure(
                "native library released the ready callback unused"
                    .to_string(),
            ));
        }

        match self.state() {
            State::Ready => {
                tracing::debug!(?data_dir, "initialized");
                Ok(())
            }
            State::Disposed => Err(Error::Disposed),
            oth => Err(Error::InitializationFailure(format!(
                "unexpected state {:?} after ready",
                oth
            ))),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match *self.0.state.lock() {
            State::Ready => Ok(()),
            State::Disposed => Err(Error::Disposed),
            State::Uninitialized | State::Initializing => {
                Err(Error::NotInitialized)
            }
        }
    }

    /// Send a query, wait for its response envelope.
    pub async fn query<Q, R>(&self, req: &Q) -> Result<Response<R>>
    where
        Q: QueryMessage,
        R: DeserializeOwned,
    {
        self.call(Channel::Query, req).await
    }

    /// Send a command, wait for its response envelope.
    pub async fn cmd<C, R>(&self, req: &C) -> Result<Response<R>>
    where
        C: CmdMessage,
        R: DeserializeOwned,
    {
        self.call(Channel::Cmd, req).await
    }

    async fn call<M, R>(&self, chan: Channel, req: &M) -> Result<Response<R>>
    where
        M: Message,
        R: DeserializeOwned,
    {
        self.ensure_ready()?;

        let tag = req.tag();
        let json = codec::encode(req)?;

        // the callback owns the only resolver, that is the correlation
        let (resolver, pending) = slot::slot::<Vec<u8>>();
        let on_result: ResultCb = Box::new(move |buf: NativeBuffer<'_>| {
            resolver.resolve(buf.to_vec());
        });

        tracing::debug!(?chan, tag, "dispatch");
        self.0.adapter.call(chan, &json, on_result)?;

        let raw = pending.await?;
        tracing::debug!(?chan, tag, len = raw.len(), "resolved");

        codec::decode_response(&raw).map_err(|err| {
            tracing::warn!(
                ?chan,
                tag,
                %err,
                raw = %String::from_utf8_lossy(&raw),
                "undecodable response"
            );
            Error::Decode(err)
        })
    }

    /// Shut the bridge down and release the process lock.
    ///
    /// Outstanding calls are left alone: if their callbacks still fire
    /// they complete normally, if not they stay pending.
    pub fn dispose(&self) {
        let prev =
            std::mem::replace(&mut *self.0.state.lock(), State::Disposed);
        if self.0.adapter.release() {
            tracing::info!(?prev, "bridge disposed");
        }
    }

    async fn query_expect(&self, req: QueryRequest) -> Result<QueryResponse> {
        match self.query::<_, QueryResponse>(&req).await?.into_result()? {
            Some(res) => Ok(res),
            None => Err(Error::UnexpectedResponse(codec::OK_TAG.to_string())),
        }
    }

    async fn command(&self, req: CmdRequest) -> Result<()> {
        match self.cmd::<_, CmdResponse>(&req).await?.into_result()? {
            Some(CmdResponse::Ok) | None => Ok(()),
        }
    }

    /// Fetch the node configuration.
    pub async fn get_conf(&self) -> Result<Configuration> {
        match self.query_expect(QueryRequest::GetConf).await? {
            QueryResponse::Conf(conf) => Ok(conf),
            oth => Err(Error::UnexpectedResponse(oth.tag().to_string())),
        }
    }

    /// Fetch the peers discovered so far.
    pub async fn get_discovered_peers(&self) -> Result<Vec<PeerMetadata>> {
        match self.query_expect(QueryRequest::GetDiscoveredPeers).await? {
            QueryResponse::DiscoveredPeers(peers) => Ok(peers),
            oth => Err(Error::UnexpectedResponse(oth.tag().to_string())),
        }
    }

    /// Fetch a pairing payload to show as a qr code.
    pub async fn get_sharable_qr_code(&self) -> Result<QrPayload> {
        match self.query_expect(QueryRequest::GetSharableQrCode).await? {
            QueryResponse::SharableQrCode(code) => Ok(code),
            oth => Err(Error::UnexpectedResponse(oth.tag().to_string())),
        }
    }

    /// Start discovery.
    pub async fn start_discovery(&self) -> Result<()> {
        self.command(CmdRequest::StartDiscovery).await
    }

    /// Stop discovery.
    pub async fn stop_discovery(&self) -> Result<()> {
        self.command(CmdRequest::StopDiscovery).await
    }

    /// Replace the node configuration.
    pub async fn set_conf(&self, conf: Configuration) -> Result<()> {
        self.command(CmdRequest::SetConf(conf)).await
    }

    /// Send a request to a peer.
    pub async fn send_peer(
        &self,
        peer: PeerId,
        req: PeerRequest,
    ) -> Result<()> {
        self.command(CmdRequest::SendPeer { peer, req }).await
    }

    /// Ask a peer to open `uri`.
    pub async fn launch_uri<U: Into<String>>(
        &self,
        peer: PeerId,
        uri: U,
    ) -> Result<()> {
        self.send_peer(peer, PeerRequest::LaunchUri(uri.into())).await
    }

    /// Pair using a scanned qr payload.
    pub async fn pair(&self, payload: QrPayload) -> Result<()> {
        self.command(CmdRequest::Pair(payload)).await
    }

    /// Accept control session `sid` from `peer`.
    pub async fn accept(&self, peer: PeerId, sid: u64) -> Result<()> {
        self.command(CmdRequest::Ack {
            peer,
            sid,
            ack: Ack::Accepted,
        })
        .await
    }

    /// Refuse control session `sid` from `peer`.
    pub async fn cancel(&self, peer: PeerId, sid: u64) -> Result<()> {
        self.command(CmdRequest::Ack {
            peer,
            sid,
            ack: Ack::Cancelled,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::MockNative;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CONF: &str = r#"{"err":null,"res":{"Conf":{"name":"desk","id":"me","known_peers":[],"auto_accept":false}}}"#;
    const PEERS: &str = r#"{"err":null,"res":{"DiscoveredPeers":[{"name":"phone","id":"p2","typ":"AndroidDevice","addr":"[fe80::2]:4000"}]}}"#;
    const OK: &str = r#"{"err":null,"res":"Ok"}"#;

    fn config() -> BridgeConfig {
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::Relaxed);
        BridgeConfig::default()
            .with_lock_name(format!("flydrop-bridge-test-{}", n))
    }

    async fn ready_bridge() -> (Arc<MockNative>, Bridge) {
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        let init = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .initialize(Path::new("/tmp/flydrop"), |_evt: ApiEvent| ())
                    .await
            })
        };
        while !mock.ready() {
            tokio::task::yield_now().await;
        }
        init.await.unwrap().unwrap();
        (mock, bridge)
    }

    #[tokio::test]
    async fn initialize_waits_for_ready() {
        let dir = tempfile::tempdir().unwrap();
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        assert_eq!(State::Uninitialized, bridge.state());

        let init = {
            let bridge = bridge.clone();
            let dir = dir.path().to_path_buf();
            tokio::spawn(async move {
                bridge.initialize(&dir, |_evt: ApiEvent| ()).await
            })
        };
        while bridge.state() != State::Initializing {
            tokio::task::yield_now().await;
        }
        assert_eq!(Some(dir.path().to_path_buf()), mock.data_dir());

        // still waiting on native
        assert!(matches!(
            bridge.query::<_, QueryResponse>(&QueryRequest::GetConf).await,
            Err(Error::NotInitialized)
        ));

        assert!(mock.ready());
        init.await.unwrap().unwrap();
        assert_eq!(State::Ready, bridge.state());
    }

    #[tokio::test]
    async fn query_before_ready_never_reaches_native() {
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        assert!(matches!(
            bridge.query::<_, QueryResponse>(&QueryRequest::GetConf).await,
            Err(Error::NotInitialized)
        ));
        assert!(matches!(
            bridge.start_discovery().await,
            Err(Error::NotInitialized)
        ));
        assert_eq!(0, mock.issued());
    }

    #[tokio::test]
    async fn initialize_twice_fails() {
        let (_mock, bridge) = ready_bridge().await;
        assert!(matches!(
            bridge.initialize(Path::new("/tmp"), |_evt: ApiEvent| ()).await,
            Err(Error::InitializationFailure(_))
        ));
        assert_eq!(State::Ready, bridge.state());
    }

    #[tokio::test]
    async fn dropped_ready_callback_fails_init() {
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        let init = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .initialize(Path::new("/tmp"), |_evt: ApiEvent| ())
                    .await
            })
        };
        while bridge.state() != State::Initializing {
            tokio::task::yield_now().await;
        }
        mock.drop_ready();
        assert!(matches!(
            init.await.unwrap(),
            Err(Error::InitializationFailure(_))
        ));
        assert_eq!(State::Uninitialized, bridge.state());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_queries_resolve_their_own_caller() {
        let (mock, bridge) = ready_bridge().await;

        let conf = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        let peers = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_discovered_peers().await })
        };
        mock.wait_issued(2).await;

        assert_eq!(
            vec![
                (Channel::Query, "\"GetConf\"".to_string()),
                (Channel::Query, "\"GetDiscoveredPeers\"".to_string()),
            ],
            mock.calls(),
        );

        // answer in reverse order, from a foreign thread
        let driver = {
            let mock = mock.clone();
            std::thread::spawn(move || {
                assert!(mock.respond(1, PEERS));
                assert!(mock.respond(0, CONF));
            })
        };
        driver.join().unwrap();

        let peers = peers.await.unwrap().unwrap();
        assert_eq!(1, peers.len());
        assert_eq!("p2", peers[0].id.0);
        assert_eq!(DeviceType::AndroidDevice, peers[0].device_type);

        let conf = conf.await.unwrap().unwrap();
        assert_eq!("desk", conf.name);
        assert!(conf.known_peers.is_empty());
    }

    #[tokio::test]
    async fn remote_error_is_surfaced() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        mock.respond(0, r#"{"err":"boom","res":null}"#);
        assert!(matches!(
            call.await.unwrap(),
            Err(Error::Remote(msg)) if msg == "boom"
        ));
    }

    #[tokio::test]
    async fn raw_envelope_is_returned() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge
                    .query::<_, QueryResponse>(&QueryRequest::GetConf)
                    .await
            })
        };
        mock.wait_issued(1).await;
        mock.respond(0, r#"{"err":"no conf yet","res":null}"#);
        assert_eq!(
            Response::Err("no conf yet".to_string()),
            call.await.unwrap().unwrap()
        );
    }

    #[tokio::test]
    async fn malformed_response_fails_the_call() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        mock.respond(0, "{\"err\":null,\"res\":{\"Conf\":");
        assert!(matches!(call.await.unwrap(), Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn wrong_variant_is_unexpected() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        mock.respond(0, PEERS);
        assert!(matches!(
            call.await.unwrap(),
            Err(Error::UnexpectedResponse(tag)) if tag == "DiscoveredPeers"
        ));
    }

    #[tokio::test]
    async fn commands_encode_and_complete() {
        let (mock, bridge) = ready_bridge().await;

        let calls = {
            let bridge = bridge.clone();
            tokio::spawn(async move {
                bridge.accept("p1".into(), 7).await?;
                bridge.launch_uri("p1".into(), "https://example.com").await?;
                bridge.stop_discovery().await
            })
        };
        mock.wait_issued(1).await;
        mock.respond(0, OK);
        mock.wait_issued(2).await;
        mock.respond(1, "\"Ok\"");
        mock.wait_issued(3).await;
        mock.respond(2, OK);
        calls.await.unwrap().unwrap();

        assert_eq!(
            vec![
                (
                    Channel::Cmd,
                    r#"{"Ack":{"peer":"p1","sid":7,"ack":"Accepted"}}"#.to_string()
                ),
                (
                    Channel::Cmd,
                    r#"{"SendPeer":{"peer":"p1","req":{"LaunchUri":"https://example.com"}}}"#
                        .to_string()
                ),
                (Channel::Cmd, "\"StopDiscovery\"".to_string()),
            ],
            mock.calls(),
        );
    }

    #[tokio::test]
    async fn dropped_result_callback_is_abandoned() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.start_discovery().await })
        };
        mock.wait_issued(1).await;
        mock.drop_call(0);
        assert!(matches!(call.await.unwrap(), Err(Error::Abandoned)));
    }

    #[tokio::test]
    async fn late_response_after_timeout_is_discarded() {
        let (mock, bridge) = ready_bridge().await;
        let res = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            bridge.get_conf(),
        )
        .await;
        assert!(res.is_err());

        // the native side finally answers, nobody is listening
        assert!(mock.respond(0, CONF));
        // and a duplicate answer is swallowed too
        assert!(!mock.respond(0, CONF));

        // the bridge is unaffected
        let next = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.stop_discovery().await })
        };
        mock.wait_issued(2).await;
        mock.respond(1, OK);
        next.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn events_reach_the_sink_in_order() {
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        let init = {
            let bridge = bridge.clone();
            let got = got.clone();
            tokio::spawn(async move {
                bridge
                    .initialize(Path::new("/tmp"), move |evt: ApiEvent| {
                        got.lock().push(evt)
                    })
                    .await
            })
        };
        while !mock.ready() {
            tokio::task::yield_now().await;
        }
        init.await.unwrap().unwrap();

        mock.emit(r#"{"AppControlUpdate":{"peer":"p1","status":"Waiting"}}"#);
        mock.emit(r#"{"Unheard":{"of":1}}"#);
        mock.emit(r#"{"AppControlUpdate":{"peer":"p1","status":"Success"}}"#);
        mock.emit(
            r#"{"Discovered":{"name":"tv","id":"p3","typ":12,"addr":"10.0.0.9:4000"}}"#,
        );

        let got = got.lock();
        assert_eq!(3, got.len());
        assert_eq!(
            ApiEvent::AppControlUpdate {
                peer: "p1".into(),
                status: ControlStatus::Waiting,
            },
            got[0]
        );
        assert_eq!(
            ApiEvent::AppControlUpdate {
                peer: "p1".into(),
                status: ControlStatus::Success,
            },
            got[1]
        );
        match &got[2] {
            ApiEvent::Discovered(meta) => {
                assert_eq!(DeviceType::LinuxDevice, meta.device_type)
            }
            oth => panic!("unexpected {:?}", oth),
        }
    }

    #[tokio::test]
    async fn second_bridge_on_same_lock_fails() {
        let conf = config();
        let first = Bridge::new(MockNative::new(), conf.clone()).unwrap();
        assert!(matches!(
            Bridge::new(MockNative::new(), conf.clone()),
            Err(Error::InitializationFailure(_))
        ));

        first.dispose();
        let _second = Bridge::new(MockNative::new(), conf).unwrap();
    }

    #[tokio::test]
    async fn disposed_bridge_rejects_calls() {
        let (mock, bridge) = ready_bridge().await;
        bridge.dispose();
        bridge.dispose();
        assert_eq!(State::Disposed, bridge.state());
        assert!(matches!(bridge.get_conf().await, Err(Error::Disposed)));
        assert!(matches!(
            bridge.initialize(Path::new("/tmp"), |_evt: ApiEvent| ()).await,
            Err(Error::InitializationFailure(_))
        ));
        assert_eq!(0, mock.issued());
    }

    #[tokio::test]
    async fn dispose_leaves_outstanding_calls_alone() {
        let (mock, bridge) = ready_bridge().await;
        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        bridge.dispose();
        mock.respond(0, CONF);
        assert_eq!("desk", call.await.unwrap().unwrap().name);
    }

    #[tokio::test]
    async fn late_ready_after_abandoned_initialize() {
        let mock = MockNative::new();
        let bridge = Bridge::new(mock.clone(), config()).unwrap();
        let res = tokio::time::timeout(
            Duration::from_millis(10),
            bridge.initialize(Path::new("/tmp"), |_evt: ApiEvent| ()),
        )
        .await;
        assert!(res.is_err());
        assert_eq!(State::Initializing, bridge.state());

        assert!(mock.ready());
        assert_eq!(State::Ready, bridge.state());

        let call = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_conf().await })
        };
        mock.wait_issued(1).await;
        mock.respond(0, CONF);
        assert_eq!("desk", call.await.unwrap().unwrap().name);
    }

    #[tokio::test]
    async fn configured_ready_timeout() {
        let mock = MockNative::new();
        let conf = config().with_ready_timeout(Duration::from_millis(10));
        let bridge = Bridge::new(mock.clone(), conf).unwrap();
        assert!(matches!(
            bridge.initialize(Path::new("/tmp"), |_evt: ApiEvent| ()).await,
            Err(Error::InitializationFailure(_))
        ));
        assert_eq!(State::Initializing, bridge.state());

        assert!(mock.ready());
        assert_eq!(State::Ready, bridge.state());
    }

    #[tokio::test]
    async fn one_bridge_per_process() {
        let first =
            Bridge::new(MockNative::new(), BridgeConfig::default()).unwrap();
        assert!(matches!(
            Bridge::new(MockNative::new(), BridgeConfig::default()),
            Err(Error::InitializationFailure(_))
        ));
        first.dispose();
    }
}
