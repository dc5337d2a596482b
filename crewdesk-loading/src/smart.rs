use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::options::{LoadingInputs, LoadingOptions};

/// What the UI should render for one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadingSignal {
    pub should_show_loading: bool,
    pub is_initial_load: bool,
    pub is_background_refetch: bool,
    pub has_loaded_once: bool,
}

/// Where the indicator is in its Idle → Pending → Showing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadingPhase {
    Idle,
    /// The condition holds; the indicator shows at the deadline.
    Pending,
    Showing,
}

enum Phase {
    Idle,
    Pending {
        deadline: Instant,
        generation: u64,
        timer: CancellationToken,
    },
    Showing,
}

struct State {
    inputs: LoadingInputs,
    has_loaded_once: bool,
    phase: Phase,
    generation: u64,
}

struct Inner {
    options: LoadingOptions,
    state: Mutex<State>,
    signals: watch::Sender<LoadingSignal>,
}

/// Debounced loading indicator.
///
/// Feed it the flags of a query through [`update`](Self::update). The
/// indicator turns on only after the loading condition has held for
/// `loading_delay` without interruption, and turns off as soon as the
/// condition drops. Background refetches of already loaded data count only
/// when `show_background_refetch` is set.
///
/// The delay timer is a spawned task when a tokio runtime is available; the
/// deadline is also checked on every [`signal`](Self::signal) call, so the
/// indicator can be polled without one. Dropping the `SmartLoading` cancels
/// a pending timer.
pub struct SmartLoading {
    inner: Arc<Inner>,
}

impl SmartLoading {
    pub fn new(options: LoadingOptions) -> Self {
        let (signals, _) = watch::channel(LoadingSignal::default());
        Self {
            inner: Arc::new(Inner {
                options,
                state: Mutex::new(State {
                    inputs: LoadingInputs::default(),
                    has_loaded_once: false,
                    phase: Phase::Idle,
                    generation: 0,
                }),
                signals,
            }),
        }
    }

    pub fn options(&self) -> &LoadingOptions {
        &self.inner.options
    }

    /// Apply new query flags and return the resulting signal.
    pub fn update(&self, inputs: impl Into<LoadingInputs>) -> LoadingSignal {
        let inputs = inputs.into();
        let mut state = self.inner.lock();
        state.inputs = inputs;
        if inputs.has_data && !state.has_loaded_once {
            state.has_loaded_once = true;
            tracing::trace!("first data received");
        }

        let condition = self.inner.condition(&state);
        let phase = std::mem::replace(&mut state.phase, Phase::Idle);
        let next = match (condition, phase) {
            (true, Phase::Idle) => self.arm(&mut state),
            (true, phase) => phase,
            (false, Phase::Pending { timer, .. }) => {
                timer.cancel();
                Phase::Idle
            }
            (false, _) => Phase::Idle,
        };
        state.phase = next;

        self.inner.publish(&mut state)
    }

    /// The current signal, promoting an expired pending delay.
    pub fn signal(&self) -> LoadingSignal {
        let mut state = self.inner.lock();
        self.inner.publish(&mut state)
    }

    pub fn phase(&self) -> LoadingPhase {
        let mut state = self.inner.lock();
        self.inner.publish(&mut state);
        match state.phase {
            Phase::Idle => LoadingPhase::Idle,
            Phase::Pending { .. } => LoadingPhase::Pending,
            Phase::Showing => LoadingPhase::Showing,
        }
    }

    /// Receive every signal change, including the one raised when the delay
    /// elapses.
    pub fn subscribe(&self) -> watch::Receiver<LoadingSignal> {
        self.inner.signals.subscribe()
    }

    fn arm(&self, state: &mut State) -> Phase {
        let delay = self.inner.options.loading_delay;
        if delay.is_zero() {
            return Phase::Showing;
        }
        state.generation += 1;
        let generation = state.generation;
        let deadline = Instant::now() + delay;
        let timer = CancellationToken::new();

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let cancelled = timer.clone();
                let inner = Arc::downgrade(&self.inner);
                runtime.spawn(run_timer(inner, deadline, generation, cancelled));
            }
            Err(_) => tracing::trace!("no runtime, loading delay is checked on read"),
        }

        Phase::Pending {
            deadline,
            generation,
            timer,
        }
    }
}

impl Default for SmartLoading {
    fn default() -> Self {
        Self::new(LoadingOptions::default())
    }
}

impl Drop for SmartLoading {
    fn drop(&mut self) {
        if let Phase::Pending { timer, .. } = &self.inner.lock().phase {
            timer.cancel();
        }
    }
}

impl std::fmt::Debug for SmartLoading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartLoading")
            .field("options", &self.inner.options)
            .field("signal", &*self.inner.signals.borrow())
            .finish()
    }
}

async fn run_timer(inner: Weak<Inner>, deadline: Instant, generation: u64, cancelled: CancellationToken) {
    tokio::select! {
        _ = cancelled.cancelled() => {}
        _ = tokio::time::sleep_until(deadline) => {
            if let Some(inner) = inner.upgrade() {
                let mut state = inner.lock();
                let current = matches!(
                    state.phase,
                    Phase::Pending { generation: armed, .. } if armed == generation
                );
                if current {
                    inner.publish(&mut state);
                    tracing::debug!(generation, "loading indicator shown");
                }
            }
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn condition(&self, state: &State) -> bool {
        let signal = self.derive(state, false);
        signal.is_initial_load || (self.options.show_background_refetch && signal.is_background_refetch)
    }

    fn derive(&self, state: &State, showing: bool) -> LoadingSignal {
        let inputs = state.inputs;
        LoadingSignal {
            should_show_loading: showing,
            is_initial_load: inputs.is_loading && !state.has_loaded_once && self.options.is_data_query,
            is_background_refetch: inputs.is_fetching && inputs.has_data && state.has_loaded_once,
            has_loaded_once: state.has_loaded_once,
        }
    }

    /// Promote an expired pending phase, then broadcast the signal if it
    /// changed.
    fn publish(&self, state: &mut State) -> LoadingSignal {
        if let Phase::Pending { deadline, .. } = state.phase {
            if Instant::now() >= deadline {
                state.phase = Phase::Showing;
            }
        }
        let signal = self.derive(state, matches!(state.phase, Phase::Showing));
        self.signals.send_if_modified(|current| {
            if *current == signal {
                false
            } else {
                *current = signal;
                true
            }
        });
        signal
    }
}
