//! Interceptor registry
//!
//! Tracks whether the global primitives are currently instrumented and holds
//! the implementations that were installed before interception started, so
//! [`stop`] can put back exactly those.
//!
//! ```text
//!   Inactive --start()--> Active(saved originals)
//!      ^                        |
//!      +--------stop()----------+
//! ```

mod axios;
mod fetch;
pub mod normalize;
mod xhr;

pub use axios::attach;

use crate::runtime::{install_fetch, install_prototype, installed_fetch, prototype, FetchPrimitive, XhrPrototype};
use crate::storage;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Implementations that were live right before interception started
struct SavedPrimitives {
    fetch: Arc<dyn FetchPrimitive>,
    xhr: XhrPrototype,
}

enum Registry {
    Inactive,
    Active(SavedPrimitives),
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::Inactive));

/// Mirrors `Registry::Active` for lock-free reads from interceptors
static ACTIVE: AtomicBool = AtomicBool::new(false);

fn registry() -> MutexGuard<'static, Registry> {
    REGISTRY.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Instrument the global fetch and XHR primitives.
///
/// Returns `false` if interception was already running.
pub fn start() -> bool {
    let mut registry = registry();
    if matches!(*registry, Registry::Active(_)) {
        return false;
    }

    // Saved on every Inactive -> Active transition, not only the first one:
    // a primitive installed while stopped is wrapped now and restored by the
    // next stop. Repeated starts return above, so wrappers are never saved.
    let saved = SavedPrimitives {
        fetch: installed_fetch(),
        xhr: prototype(),
    };
    install_fetch(Arc::new(fetch::TracedFetch::new(Arc::clone(&saved.fetch))));
    install_prototype(xhr::instrument(&saved.xhr));
    *registry = Registry::Active(saved);
    ACTIVE.store(true, Ordering::SeqCst);

    if storage::config().enable_console_logs {
        tracing::info!("HttpTrace: network interceptors started");
    }
    true
}

/// Restore the primitives saved by [`start`].
///
/// Returns `false` if interception was not running.
pub fn stop() -> bool {
    let mut registry = registry();
    let Registry::Active(saved) = std::mem::replace(&mut *registry, Registry::Inactive) else {
        return false;
    };

    install_fetch(saved.fetch);
    install_prototype(saved.xhr);
    xhr::clear_pending();
    ACTIVE.store(false, Ordering::SeqCst);

    if storage::config().enable_console_logs {
        tracing::info!("HttpTrace: network interceptors stopped");
    }
    true
}

pub fn is_active() -> bool {
    ACTIVE.load(Ordering::SeqCst)
}

/// Stop interception and forget all in-flight correlation state
#[cfg(test)]
pub(crate) fn reset_for_tests() {
    stop();
    axios::clear_in_flight();
    xhr::clear_pending();
}
