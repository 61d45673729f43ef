// ── Reconciliation scheduler ──
//
// Polls both status feeds concurrently, merges them, and publishes the
// result through a watch channel. Refreshes are single-flight: a caller
// that arrives while a cycle is running waits for that cycle's result
// instead of starting another.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::Stream;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReconcilerConfig;
use crate::error::CoreError;
use crate::model::{FeedStatus, LinkEntry, RadioNode, RadioView, SasEntry};
use crate::radio::RadioMerger;
use crate::source::StatusSource;

/// Periodic and on-demand merge of the link and spectrum feeds.
///
/// Cheaply cloneable; all clones share one merger and one published view.
pub struct Reconciler<L, S> {
    inner: Arc<Inner<L, S>>,
}

impl<L, S> Clone for Reconciler<L, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<L, S> {
    link: L,
    sas: S,
    interval: Duration,
    feed_timeout: Duration,
    /// Held for the duration of a cycle, including publication.
    cycle: Mutex<()>,
    merger: Mutex<RadioMerger>,
    view: watch::Sender<Arc<RadioView>>,
}

impl<L, S> Reconciler<L, S>
where
    L: StatusSource<Entry = LinkEntry>,
    S: StatusSource<Entry = SasEntry>,
{
    pub fn new(link: L, sas: S, config: ReconcilerConfig) -> Self {
        let merger = RadioMerger::new(&config.inventory, config.retention);
        let (view, _) = watch::channel(Arc::new(RadioView::default()));
        Self {
            inner: Arc::new(Inner {
                link,
                sas,
                interval: config.interval,
                feed_timeout: config.feed_timeout,
                cycle: Mutex::new(()),
                merger: Mutex::new(merger),
                view,
            }),
        }
    }

    /// The most recently published view. Never blocks on a running cycle.
    pub fn current(&self) -> Arc<RadioView> {
        self.inner.view.borrow().clone()
    }

    /// Subscribe to every future publication.
    pub fn subscribe(&self) -> ViewStream {
        ViewStream::new(self.inner.view.subscribe())
    }

    /// Run a reconciliation cycle now, or join the one already running.
    ///
    /// Feed failures do not fail the refresh: the returned view marks the
    /// affected feed unavailable (see [`RadioView::is_partial`]).
    pub async fn refresh(&self) -> Arc<RadioView> {
        if let Ok(_cycle) = self.inner.cycle.try_lock() {
            return self.run_cycle().await;
        }

        debug!("reconciliation already in flight; joining");
        // The holder publishes before it releases the cycle lock.
        drop(self.inner.cycle.lock().await);
        self.current()
    }

    /// Seed the merger and the published view from an earlier view.
    ///
    /// Grant history keeps accumulating across restarts, and a grant that
    /// changed while no process was watching is still recorded.
    pub async fn restore(&self, view: RadioView) {
        let mut merger = self.inner.merger.lock().await;
        merger.restore(view.nodes.clone());
        self.inner.view.send_replace(Arc::new(view));
    }

    /// Forget a node and republish the view without it.
    pub async fn remove_node(&self, serial_number: &str) -> Option<RadioNode> {
        let mut merger = self.inner.merger.lock().await;
        let removed = merger.remove_node(serial_number)?;

        let mut view = (*self.current()).clone();
        view.nodes.remove(serial_number);
        self.inner.view.send_replace(Arc::new(view));
        info!(serial_number, "radio node removed");
        Some(removed)
    }

    /// Spawn the periodic refresh loop. The first cycle runs immediately.
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.inner.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let view = this.refresh().await;
                        debug!(nodes = view.nodes.len(), partial = view.is_partial(), "periodic refresh complete");
                    }
                }
            }
            debug!("reconciliation task stopped");
        })
    }

    async fn run_cycle(&self) -> Arc<RadioView> {
        let timeout = self.inner.feed_timeout;
        let (link, sas) = tokio::join!(
            fetch_bounded(&self.inner.link, timeout),
            fetch_bounded(&self.inner.sas, timeout),
        );
        let (link, link_status) = feed_outcome(self.inner.link.name(), link);
        let (sas, sas_status) = feed_outcome(self.inner.sas.name(), sas);

        let now = Utc::now();
        let mut merger = self.inner.merger.lock().await;
        let nodes = merger.merge(link.as_deref(), sas.as_deref(), now);
        let view = Arc::new(RadioView {
            refreshed_at: Some(now),
            link: link_status,
            sas: sas_status,
            nodes,
        });

        self.inner.view.send_replace(Arc::clone(&view));
        view
    }
}

async fn fetch_bounded<Src: StatusSource>(
    source: &Src,
    timeout: Duration,
) -> Result<Vec<Src::Entry>, CoreError> {
    match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(result) => result,
        Err(_) => Err(CoreError::FeedUnavailable {
            feed: source.name().into(),
            reason: format!("timed out after {}s", timeout.as_secs()),
        }),
    }
}

fn feed_outcome<E>(
    feed: &'static str,
    result: Result<Vec<E>, CoreError>,
) -> (Option<Vec<E>>, FeedStatus) {
    match result {
        Ok(entries) => (Some(entries), FeedStatus::Available),
        Err(CoreError::FeedNotConfigured { .. }) => (None, FeedStatus::NotConfigured),
        Err(e) => {
            warn!(feed, error = %e, "status feed unavailable for this cycle");
            (
                None,
                FeedStatus::Unavailable {
                    reason: e.to_string(),
                },
            )
        }
    }
}

// ── View subscription ────────────────────────────────────────────────

/// A subscription to published radio views.
pub struct ViewStream {
    current: Arc<RadioView>,
    receiver: watch::Receiver<Arc<RadioView>>,
}

impl ViewStream {
    fn new(receiver: watch::Receiver<Arc<RadioView>>) -> Self {
        let current = receiver.borrow().clone();
        Self { current, receiver }
    }

    /// The view captured at subscription time or at the last `changed()`.
    pub fn current(&self) -> &Arc<RadioView> {
        &self.current
    }

    /// Wait for the next publication. `None` once the reconciler is gone.
    pub async fn changed(&mut self) -> Option<Arc<RadioView>> {
        self.receiver.changed().await.ok()?;
        let view = self.receiver.borrow_and_update().clone();
        self.current = Arc::clone(&view);
        Some(view)
    }

    /// Convert into a `Stream` of views.
    pub fn into_stream(self) -> impl Stream<Item = Arc<RadioView>> + Send + Unpin {
        Box::pin(futures_util::stream::unfold(self.receiver, |mut rx| async move {
            rx.changed().await.ok()?;
            let view = rx.borrow_and_update().clone();
            Some((view, rx))
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures_util::StreamExt;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::InventoryEntry;
    use crate::model::SasState;

    #[derive(Clone)]
    enum Script<E> {
        Ok(Vec<E>),
        Fail,
        NotConfigured,
        Hang,
    }

    struct ScriptedSource<E> {
        name: &'static str,
        script: std::sync::Mutex<Script<E>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl<E: Clone> ScriptedSource<E> {
        fn new(name: &'static str, script: Script<E>) -> Self {
            Self {
                name,
                script: std::sync::Mutex::new(script),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn set(&self, script: Script<E>) {
            *self.script.lock().unwrap() = script;
        }
    }

    impl<E: Clone + Send + Sync + 'static> StatusSource for Arc<ScriptedSource<E>> {
        type Entry = E;

        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch(&self) -> Result<Vec<E>, CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let script = self.script.lock().unwrap().clone();
            match script {
                Script::Ok(entries) => Ok(entries),
                Script::Fail => Err(CoreError::FeedUnavailable {
                    feed: self.name.into(),
                    reason: "connection refused".into(),
                }),
                Script::NotConfigured => Err(CoreError::FeedNotConfigured {
                    feed: self.name.into(),
                }),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    type Sources = (Arc<ScriptedSource<LinkEntry>>, Arc<ScriptedSource<SasEntry>>);

    fn sources(link: Script<LinkEntry>, sas: Script<SasEntry>) -> Sources {
        (
            Arc::new(ScriptedSource::new("link", link)),
            Arc::new(ScriptedSource::new("sas", sas)),
        )
    }

    fn reconciler(
        (link, sas): &Sources,
        config: ReconcilerConfig,
    ) -> Reconciler<Arc<ScriptedSource<LinkEntry>>, Arc<ScriptedSource<SasEntry>>> {
        Reconciler::new(Arc::clone(link), Arc::clone(sas), config)
    }

    fn link_entry(serial: &str) -> LinkEntry {
        LinkEntry {
            serial_number: serial.into(),
            ip: Ipv4Addr::new(10, 48, 0, 159),
            connected: true,
            connected_at: None,
        }
    }

    fn sas_entry(serial: &str, state: SasState) -> SasEntry {
        SasEntry {
            serial_number: serial.into(),
            sas_state: state,
            grants: Vec::new(),
            fcc_id: None,
        }
    }

    #[tokio::test]
    async fn refresh_publishes_merged_view() {
        let src = sources(
            Script::Ok(vec![link_entry("SN-100")]),
            Script::Ok(vec![sas_entry("SN-100", SasState::Registered)]),
        );
        let reconciler = reconciler(&src, ReconcilerConfig::default());
        assert!(reconciler.current().refreshed_at.is_none());

        let view = reconciler.refresh().await;
        assert_eq!(view.link, FeedStatus::Available);
        assert_eq!(view.sas, FeedStatus::Available);
        assert!(view.node("SN-100").unwrap().link_connected);
        assert!(Arc::ptr_eq(&view, &reconciler.current()));
    }

    #[tokio::test]
    async fn failed_feed_yields_partial_view() {
        let src = sources(
            Script::Ok(vec![link_entry("SN-100")]),
            Script::Ok(vec![sas_entry("SN-100", SasState::Registered)]),
        );
        let reconciler = reconciler(&src, ReconcilerConfig::default());
        reconciler.refresh().await;

        src.1.set(Script::Fail);
        let view = reconciler.refresh().await;
        assert!(view.is_partial());
        assert!(matches!(view.sas, FeedStatus::Unavailable { .. }));
        let node = view.node("SN-100").unwrap();
        assert!(node.link_connected);
        assert_eq!(node.sas_state, SasState::Unregistered);
    }

    #[tokio::test]
    async fn unconfigured_feed_is_not_partial() {
        let src = sources(Script::Ok(vec![link_entry("SN-100")]), Script::NotConfigured);
        let view = reconciler(&src, ReconcilerConfig::default()).refresh().await;

        assert_eq!(view.sas, FeedStatus::NotConfigured);
        assert!(!view.is_partial());
        assert_eq!(view.node("SN-100").unwrap().sas_state, SasState::Unregistered);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_feed_times_out() {
        let src = sources(Script::Hang, Script::Ok(vec![]));
        let config = ReconcilerConfig {
            feed_timeout: Duration::from_secs(3),
            ..ReconcilerConfig::default()
        };
        let view = reconciler(&src, config).refresh().await;

        match &view.link {
            FeedStatus::Unavailable { reason } => assert!(reason.contains("timed out")),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(view.sas, FeedStatus::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_cycle() {
        let link = Arc::new(ScriptedSource {
            delay: Duration::from_millis(500),
            ..ScriptedSource::new("link", Script::Ok(vec![link_entry("SN-100")]))
        });
        let sas = Arc::new(ScriptedSource::new("sas", Script::Ok(vec![])));
        let reconciler = Reconciler::new(Arc::clone(&link), Arc::clone(&sas), ReconcilerConfig::default());

        let (a, b) = tokio::join!(reconciler.refresh(), reconciler.refresh());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(link.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sas.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_refreshes_until_cancelled() {
        let src = sources(Script::Ok(vec![link_entry("SN-100")]), Script::Ok(vec![]));
        let config = ReconcilerConfig {
            interval: Duration::from_secs(120),
            ..ReconcilerConfig::default()
        };
        let reconciler = reconciler(&src, config);
        let mut stream = reconciler.subscribe().into_stream();

        let cancel = CancellationToken::new();
        let handle = reconciler.spawn(cancel.clone());

        let first = stream.next().await.unwrap();
        assert!(first.node("SN-100").is_some());

        tokio::time::advance(Duration::from_secs(120)).await;
        stream.next().await.unwrap();
        assert_eq!(src.0.calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn inventory_nodes_survive_removal_only_when_asked() {
        let src = sources(Script::Ok(vec![]), Script::Ok(vec![]));
        let config = ReconcilerConfig {
            inventory: vec![InventoryEntry {
                serial_number: "SN-300".into(),
                name: Some("Rooftop".into()),
                location: None,
                ip: None,
            }],
            ..ReconcilerConfig::default()
        };
        let reconciler = reconciler(&src, config);

        let view = reconciler.refresh().await;
        assert_eq!(view.node("SN-300").unwrap().display_name(), "Rooftop");

        let mut watcher = reconciler.subscribe();
        assert!(reconciler.remove_node("SN-300").await.is_some());
        let republished = watcher.changed().await.unwrap();
        assert!(republished.node("SN-300").is_none());

        let view = reconciler.refresh().await;
        assert!(view.nodes.is_empty());
    }

    #[tokio::test]
    async fn restored_view_keeps_nodes_and_history() {
        let first = sources(
            Script::Ok(vec![link_entry("SN-100")]),
            Script::Ok(vec![sas_entry("SN-100", SasState::Authorized)]),
        );
        let saved = (*reconciler(&first, ReconcilerConfig::default()).refresh().await).clone();

        let second = sources(Script::Fail, Script::Fail);
        let resumed = reconciler(&second, ReconcilerConfig::default());
        resumed.restore(saved.clone()).await;
        assert_eq!(*resumed.current(), saved);

        let view = resumed.refresh().await;
        assert!(view.is_partial());
        let node = view.node("SN-100").unwrap();
        assert!(!node.link_connected);
        assert_eq!(node.sas_state, SasState::Unregistered);
    }

    #[tokio::test]
    async fn refresh_runs_while_merger_is_busy() {
        let src = sources(Script::Ok(vec![link_entry("SN-100")]), Script::Ok(vec![]));
        let reconciler = reconciler(&src, ReconcilerConfig::default());

        let merger = reconciler.inner.merger.lock().await;
        let pending = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.refresh().await }
        });
        tokio::task::yield_now().await;
        drop(merger);

        let view = pending.await.unwrap();
        assert!(view.refreshed_at.is_some());
        assert!(view.node("SN-100").is_some());
        assert_eq!(src.0.calls.load(Ordering::SeqCst), 1);
    }
}
