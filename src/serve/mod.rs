use crate::config::RepositoryConfig;
use crate::errors::*;
use crate::repo::Engine;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_util::io::ReaderStream;
use warp::http::{Response, StatusCode};
use warp::Filter;

const DEBOUNCE: Duration = Duration::from_millis(200);
const POLL_FALLBACK: Duration = Duration::from_secs(5);

/// One (repository, tag) registration: `present` reflects whether the tag
/// currently exists in the repository's on-disk state; `registered`
/// reflects whether this engine has attached it to the serving path at
/// least once. The host mux (here, a lookup table consulted per request)
/// never shrinks once a tag is registered -- `present` is what actually
/// gates 200 vs 404.
#[derive(Debug, Default)]
pub struct RegistrationTracker {
    pub present: AtomicBool,
    pub registered: AtomicBool,
}

struct RepoRuntime {
    config: RepositoryConfig,
    engine: Mutex<Engine>,
    trackers: RwLock<HashMap<String, Arc<RegistrationTracker>>>,
}

pub struct ServerState {
    repos: Vec<Arc<RepoRuntime>>,
    active_connections: AtomicU64,
}

impl ServerState {
    pub async fn new(configs: Vec<RepositoryConfig>) -> Result<Arc<Self>> {
        let mut repos = Vec::with_capacity(configs.len());
        for config in configs {
            let engine = Engine::init(config.clone()).await?;
            repos.push(Arc::new(RepoRuntime {
                config,
                engine: Mutex::new(engine),
                trackers: RwLock::new(HashMap::new()),
            }));
        }
        Ok(Arc::new(ServerState {
            repos,
            active_connections: AtomicU64::new(0),
        }))
    }
}

/// Reset `present=false` on every known tracker, rebuild revisions/tags
/// from disk, then mark every live tag `present=true` (creating its
/// tracker if new) and `registered=true`.
async fn refresh_cycle(repo: &Arc<RepoRuntime>) -> Result<()> {
    {
        let trackers = repo.trackers.read().await;
        for tracker in trackers.values() {
            tracker.present.store(false, Ordering::SeqCst);
        }
    }

    let mut engine = repo.engine.lock().await;
    engine.refresh_state().await?;
    let live_tags: Vec<String> = engine.tags().iter().map(|(name, _)| name.to_string()).collect();
    drop(engine);

    let mut trackers = repo.trackers.write().await;
    for name in live_tags {
        let tracker = trackers
            .entry(name.clone())
            .or_insert_with(|| Arc::new(RegistrationTracker::default()));
        tracker.present.store(true, Ordering::SeqCst);
        tracker.registered.store(true, Ordering::SeqCst);
    }

    Ok(())
}

async fn watch_repo(repo: Arc<RepoRuntime>) {
    let (tx, rx) = std::sync::mpsc::channel();
    let watcher: notify::Result<RecommendedWatcher> = Watcher::new(tx, notify::Config::default());

    match watcher {
        Ok(mut watcher) => {
            if let Err(e) = watcher.watch(&repo.config.tags_dir, RecursiveMode::NonRecursive) {
                error!("failed to watch {:?}: {e}; falling back to polling", repo.config.tags_dir);
                poll_loop(repo).await;
                return;
            }

            let (signal_tx, mut signal_rx) = tokio::sync::mpsc::channel::<()>(1);
            tokio::task::spawn_blocking(move || {
                // keep the watcher alive for the lifetime of this thread
                let _watcher = watcher;
                while rx.recv().is_ok() {
                    let _ = signal_tx.try_send(());
                }
            });

            while signal_rx.recv().await.is_some() {
                tokio::time::sleep(DEBOUNCE).await;
                while signal_rx.try_recv().is_ok() {}
                if let Err(e) = refresh_cycle(&repo).await {
                    error!("refresh of {:?} failed: {e}", repo.config.name);
                }
            }
        }
        Err(e) => {
            error!("failed to initialize filesystem watcher: {e}; falling back to polling");
            poll_loop(repo).await;
        }
    }
}

async fn poll_loop(repo: Arc<RepoRuntime>) {
    let mut interval = tokio::time::interval(POLL_FALLBACK);
    loop {
        interval.tick().await;
        if let Err(e) = refresh_cycle(&repo).await {
            error!("refresh of {:?} failed: {e}", repo.config.name);
        }
    }
}

/// Join `rel` onto `base` one path segment at a time, rejecting any `..`
/// component and skipping empty segments (so a doubled slash in the
/// request path can't smuggle an absolute path past `PathBuf::join`,
/// which would otherwise discard `base` outright). `rel` is the raw,
/// attacker-controlled tail of the request path -- never trust it.
fn safe_join(base: &std::path::Path, rel: &str) -> Option<PathBuf> {
    let mut path = base.to_path_buf();
    for segment in rel.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            seg => path.push(seg),
        }
    }
    Some(path)
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("xml") => "text/xml",
        Some("gz") => "application/gzip",
        Some("rpm") => "application/x-rpm",
        _ => "application/octet-stream",
    }
}

async fn stream_file(path: PathBuf) -> Response<warp::hyper::Body> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return not_found(),
    };
    let content_type = content_type_for(&path);
    let stream = ReaderStream::new(file);
    let body = warp::hyper::Body::wrap_stream(stream);
    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", content_type)
        .body(body)
        .unwrap()
}

fn not_found() -> Response<warp::hyper::Body> {
    Response::builder()
        .status(StatusCode::NOT_FOUND)
        .body(warp::hyper::Body::from("404 - file not found\n"))
        .unwrap()
}

async fn handle_request(
    full_path: warp::filters::path::FullPath,
    state: Arc<ServerState>,
) -> std::result::Result<Response<warp::hyper::Body>, Infallible> {
    let path = full_path.as_str();

    if path == "/config" {
        return Ok(Response::builder()
            .status(StatusCode::OK)
            .header("content-type", "text/plain")
            .body(warp::hyper::Body::from(render_config(&state).await))
            .unwrap());
    }

    for repo in &state.repos {
        let prefix = format!("/{}/", repo.config.suffix);
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        let Some((tag, tail)) = rest.split_once('/') else {
            continue;
        };

        let trackers = repo.trackers.read().await;
        let Some(tracker) = trackers.get(tag) else {
            return Ok(not_found());
        };
        if !tracker.present.load(Ordering::SeqCst) {
            return Ok(not_found());
        }

        let file_path = if let Some(rd) = tail.strip_prefix("repodata/") {
            safe_join(&repo.config.tags_dir.join(tag).join("repodata"), rd)
        } else {
            safe_join(&repo.config.files_dir, tail)
        };
        drop(trackers);

        return Ok(match file_path {
            Some(path) => stream_file(path).await,
            None => not_found(),
        });
    }

    Ok(not_found())
}

async fn render_config(state: &ServerState) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "active_connections={}\n",
        state.active_connections.load(Ordering::SeqCst)
    ));
    for repo in &state.repos {
        out.push_str(&format!("repository {} (suffix={})\n", repo.config.name, repo.config.suffix));
        out.push_str("  handle                         present  registered\n");
        let trackers = repo.trackers.read().await;
        let mut names: Vec<&String> = trackers.keys().collect();
        names.sort();
        for name in names {
            let tracker = &trackers[name];
            out.push_str(&format!(
                "  {:<30} {:<8} {}\n",
                name,
                tracker.present.load(Ordering::SeqCst),
                tracker.registered.load(Ordering::SeqCst),
            ));
        }
    }
    out
}

fn count_connections(
    state: Arc<ServerState>,
) -> impl Filter<Extract = (Arc<ServerState>,), Error = Infallible> + Clone {
    warp::any().map(move || {
        state.active_connections.fetch_add(1, Ordering::SeqCst);
        state.clone()
    })
}

pub async fn run(configs: Vec<RepositoryConfig>, bind_addr: SocketAddr) -> Result<()> {
    let state = ServerState::new(configs).await?;

    for repo in &state.repos {
        refresh_cycle(repo).await?;
        tokio::spawn(watch_repo(repo.clone()));
    }

    let routes = warp::path::full()
        .and(count_connections(state.clone()))
        .and_then(handle_request);

    info!("serving on {bind_addr}");
    warp::serve(routes).run(bind_addr).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracker_starts_unset() {
        let tracker = RegistrationTracker::default();
        assert!(!tracker.present.load(Ordering::SeqCst));
        assert!(!tracker.registered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_tracker_present_registered_transition() {
        let tracker = RegistrationTracker::default();
        tracker.present.store(true, Ordering::SeqCst);
        tracker.registered.store(true, Ordering::SeqCst);
        assert!(tracker.present.load(Ordering::SeqCst));
        assert!(tracker.registered.load(Ordering::SeqCst));
    }

    /// `spec.md` §4.F: the only allowed transitions are `true -> false ->
    /// true`; once `registered` is set it never needs to be cleared again,
    /// a revoked-then-relinked tag just flips `present` back and forth.
    #[test]
    fn test_present_can_cycle_true_false_true_once_registered() {
        let tracker = RegistrationTracker::default();
        tracker.present.store(true, Ordering::SeqCst);
        tracker.registered.store(true, Ordering::SeqCst);

        tracker.present.store(false, Ordering::SeqCst);
        assert!(!tracker.present.load(Ordering::SeqCst));
        assert!(tracker.registered.load(Ordering::SeqCst));

        tracker.present.store(true, Ordering::SeqCst);
        assert!(tracker.present.load(Ordering::SeqCst));
        assert!(tracker.registered.load(Ordering::SeqCst));
    }

    #[test]
    fn test_safe_join_rejects_dotdot_component() {
        let base = std::path::Path::new("/srv/files/x");
        assert_eq!(safe_join(base, "../../../etc/passwd"), None);
        assert_eq!(safe_join(base, "a/../../etc/passwd"), None);
    }

    #[test]
    fn test_safe_join_ignores_doubled_slash_instead_of_escaping_base() {
        let base = std::path::Path::new("/srv/files/x");
        assert_eq!(
            safe_join(base, "/etc/passwd"),
            Some(std::path::PathBuf::from("/srv/files/x/etc/passwd"))
        );
        assert_eq!(
            safe_join(base, "//etc/passwd"),
            Some(std::path::PathBuf::from("/srv/files/x/etc/passwd"))
        );
    }

    #[test]
    fn test_safe_join_normal_path() {
        let base = std::path::Path::new("/srv/files/x");
        assert_eq!(
            safe_join(base, "a-1.0-1.x86_64.rpm"),
            Some(std::path::PathBuf::from("/srv/files/x/a-1.0-1.x86_64.rpm"))
        );
    }
}
