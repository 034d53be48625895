// src/context.rs
//
// Audio output context.
//
// One context exists per process. It is injected into the engine at
// construction, opened lazily on the first session start, and reused by
// every later session; sessions only attach and detach render graphs.
//
// Backends are split in two. The control half lives with the context on
// the host's UI thread; the render half (a `RenderPort`, or the cpal
// callback) owns the graphs and receives them over a channel. Graphs the
// render half is done with come back through the context's release queue.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
    mpsc::{self, Receiver, Sender, TryRecvError},
};

use log::{debug, info, warn};

use crate::bridge::{ReleaseQueue, Released};
use crate::error::BackendError;
use crate::graph::ToneGraph;

/// Most graphs allowed to fade out concurrently.
const MAX_RETIRING: usize = 4;

// ═══════════════════════════════════════════════════════════════════
// Backend trait
// ═══════════════════════════════════════════════════════════════════

/// A platform audio output.
///
/// Implementations own the device (or stand in for one) and pull audio
/// from the attached [`ToneGraph`]s on whatever thread renders.
pub trait AudioBackend {
    /// Open the output device. Called once per context. Returns the
    /// device sample rate.
    fn open(&mut self) -> Result<f64, BackendError>;

    /// Start or restart output after `open` or `suspend`.
    fn resume(&mut self) -> Result<(), BackendError>;

    /// Pause the output device without releasing it.
    fn suspend(&mut self);

    /// Connect a session graph. A previously attached graph keeps
    /// rendering until its shutdown fade finishes, then is released.
    fn attach(&mut self, graph: ToneGraph);

    /// Release every graph immediately.
    fn detach(&mut self);
}

// ═══════════════════════════════════════════════════════════════════
// Graph rack (render side)
// ═══════════════════════════════════════════════════════════════════

/// Holds the active graph plus graphs that are fading out.
///
/// Graphs leaving the rack are retired, never dropped in place.
pub(crate) struct GraphRack {
    active: Option<ToneGraph>,
    retiring: Vec<ToneGraph>,
    scratch_left: Vec<f32>,
    scratch_right: Vec<f32>,
}

impl GraphRack {
    pub(crate) fn new(max_block: usize) -> Self {
        let max_block = max_block.max(1);
        Self {
            active: None,
            retiring: Vec::with_capacity(MAX_RETIRING),
            scratch_left: vec![0.0; max_block],
            scratch_right: vec![0.0; max_block],
        }
    }

    pub(crate) fn attach(&mut self, graph: ToneGraph) {
        let Some(previous) = self.active.replace(graph) else {
            return;
        };
        if previous.is_finished() {
            previous.retire();
            return;
        }
        if self.retiring.len() == MAX_RETIRING {
            self.retiring.remove(0).retire();
        }
        self.retiring.push(previous);
    }

    pub(crate) fn clear(&mut self) {
        if let Some(graph) = self.active.take() {
            graph.retire();
        }
        while let Some(graph) = self.retiring.pop() {
            graph.retire();
        }
    }

    /// Number of graphs still connected (active or fading out).
    pub(crate) fn len(&self) -> usize {
        self.active.iter().count() + self.retiring.len()
    }

    /// Render all connected graphs, summed, into two channel slices.
    pub(crate) fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        let total = left.len().min(right.len());

        match self.active.as_mut() {
            Some(graph) => graph.render(&mut left[..total], &mut right[..total]),
            None => {
                left[..total].fill(0.0);
                right[..total].fill(0.0);
            }
        }

        let block = self.scratch_left.len();
        for graph in &mut self.retiring {
            let mut offset = 0;
            while offset < total {
                let frames = (total - offset).min(block);
                graph.render(
                    &mut self.scratch_left[..frames],
                    &mut self.scratch_right[..frames],
                );
                for i in 0..frames {
                    left[offset + i] += self.scratch_left[i];
                    right[offset + i] += self.scratch_right[i];
                }
                offset += frames;
            }
        }

        let mut i = 0;
        while i < self.retiring.len() {
            if self.retiring[i].is_finished() {
                self.retiring.remove(i).retire();
            } else {
                i += 1;
            }
        }
        if let Some(graph) = self.active.take_if(|g| g.is_finished()) {
            graph.retire();
        }
    }
}

impl Drop for GraphRack {
    fn drop(&mut self) {
        self.clear();
    }
}

// ═══════════════════════════════════════════════════════════════════
// Rack link (control half) and render port (render half)
// ═══════════════════════════════════════════════════════════════════

pub(crate) enum RackCommand {
    Attach(ToneGraph),
    Clear,
}

/// Flags shared between the two halves of a backend.
struct PortShared {
    running: AtomicBool,
    frames_rendered: AtomicU64,
}

/// Control half: forwards graphs to the render half.
pub(crate) struct RackLink {
    tx: Sender<RackCommand>,
    shared: Arc<PortShared>,
}

impl RackLink {
    pub(crate) fn send(&self, cmd: RackCommand) {
        // The rejected command (and its graph) is dropped here, on the
        // control thread.
        if self.tx.send(cmd).is_err() {
            warn!("Render side is gone; dropping rack command");
        }
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.shared.running.store(running, Ordering::Release);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub(crate) fn frames_rendered(&self) -> u64 {
        self.shared.frames_rendered.load(Ordering::Acquire)
    }
}

/// Render half of a backend.
///
/// Owns every connected graph. It is `Send`: move it to the thread that
/// services the device (an audio callback, a worklet, a test loop) and call
/// [`render_into`](Self::render_into) from there while the engine keeps
/// running on the control thread.
pub struct RenderPort {
    rack_rx: Receiver<RackCommand>,
    rack: GraphRack,
    shared: Arc<PortShared>,
}

impl RenderPort {
    /// Render into caller-provided channel slices. Silence while suspended.
    pub fn render_into(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.drain_commands();

        if !self.shared.running.load(Ordering::Acquire) {
            left.fill(0.0);
            right.fill(0.0);
            return;
        }
        self.rack.render(left, right);
        self.shared
            .frames_rendered
            .fetch_add(left.len().min(right.len()) as u64, Ordering::AcqRel);
    }

    /// Render `frames` frames into new buffers.
    pub fn render(&mut self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        self.render_into(&mut left, &mut right);
        (left, right)
    }

    /// Graphs connected as of the last render (active or fading out).
    pub fn connected_graphs(&self) -> usize {
        self.rack.len()
    }

    fn drain_commands(&mut self) {
        loop {
            match self.rack_rx.try_recv() {
                Ok(RackCommand::Attach(graph)) => self.rack.attach(graph),
                Ok(RackCommand::Clear) => self.rack.clear(),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    /// Commands still queued on the active graph. Drains them.
    #[cfg(test)]
    pub(crate) fn pending_graph_commands(&mut self) -> usize {
        self.drain_commands();
        self.rack
            .active
            .as_ref()
            .map_or(0, ToneGraph::pending_commands)
    }
}

/// Create a linked pair of backend halves.
pub(crate) fn render_link(max_block: usize) -> (RackLink, RenderPort) {
    let (tx, rack_rx) = mpsc::channel();
    let shared = Arc::new(PortShared {
        running: AtomicBool::new(false),
        frames_rendered: AtomicU64::new(0),
    });
    let link = RackLink {
        tx,
        shared: Arc::clone(&shared),
    };
    let port = RenderPort {
        rack_rx,
        rack: GraphRack::new(max_block),
        shared,
    };
    (link, port)
}

// ═══════════════════════════════════════════════════════════════════
// Audio context
// ═══════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// Device not opened yet.
    Closed,
    Running,
    Suspended,
}

struct ContextInner {
    backend: Box<dyn AudioBackend>,
    state: ContextState,
    sample_rate: f64,
    open_count: u32,
    releases: ReleaseQueue,
}

/// Shared handle to the process-wide audio output.
///
/// Cloning shares the same device; the engine and the host can both hold
/// one (the host to suspend output when backgrounded).
#[derive(Clone)]
pub struct AudioContext {
    inner: Rc<RefCell<ContextInner>>,
}

impl AudioContext {
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ContextInner {
                backend: Box::new(backend),
                state: ContextState::Closed,
                sample_rate: 0.0,
                open_count: 0,
                releases: ReleaseQueue::new(),
            })),
        }
    }

    /// Make sure the output is open and running; returns the sample rate.
    ///
    /// Opens the device on first use only. On failure the context stays
    /// in its previous state, so a later call (after a user gesture) can
    /// succeed.
    pub fn acquire(&self) -> Result<f64, BackendError> {
        let mut inner = self.inner.borrow_mut();

        if inner.state == ContextState::Closed {
            let sample_rate = inner.backend.open()?;
            inner.sample_rate = sample_rate;
            inner.open_count += 1;
            inner.state = ContextState::Suspended;
            info!("Audio output opened at {sample_rate} Hz");
        }

        if inner.state == ContextState::Suspended {
            inner.backend.resume()?;
            inner.state = ContextState::Running;
            debug!("Audio output running");
        }

        Ok(inner.sample_rate)
    }

    /// Suspend output (host backgrounded). The next `acquire` resumes it.
    pub fn suspend(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == ContextState::Running {
            inner.backend.suspend();
            inner.state = ContextState::Suspended;
            debug!("Audio output suspended");
        }
    }

    pub fn state(&self) -> ContextState {
        self.inner.borrow().state
    }

    /// Sample rate of the opened device.
    pub fn sample_rate(&self) -> Option<f64> {
        let inner = self.inner.borrow();
        (inner.state != ContextState::Closed).then_some(inner.sample_rate)
    }

    /// How many times the device has been opened. Stays at 1 across sessions.
    pub fn open_count(&self) -> u32 {
        self.inner.borrow().open_count
    }

    pub fn attach(&self, graph: ToneGraph) {
        self.inner.borrow_mut().backend.attach(graph);
    }

    pub fn detach(&self) {
        self.inner.borrow_mut().backend.detach();
    }

    /// Sender for render-side objects to come back through.
    pub fn release_sender(&self) -> Sender<Released> {
        self.inner.borrow().releases.sender()
    }

    /// Free whatever the render side has handed back. Returns the count.
    pub fn reclaim(&self) -> usize {
        let freed = self.inner.borrow().releases.drain();
        if freed > 0 {
            debug!("Freed {freed} released render object(s)");
        }
        freed
    }
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("AudioContext")
            .field("state", &inner.state)
            .field("sample_rate", &inner.sample_rate)
            .field("open_count", &inner.open_count)
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════
// Offline backend
// ═══════════════════════════════════════════════════════════════════

/// What an [`OfflineBackend`] reports when asked to open or resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    /// `open` fails: no output device.
    NoDevice,
    /// `resume` fails until the host reports a user gesture.
    GestureRequired,
}

struct OfflineControl {
    sample_rate: f64,
    availability: Cell<Availability>,
    link: RackLink,
}

/// Pull-based backend.
///
/// [`new`](Self::new) returns the control half (given to the
/// [`AudioContext`]) and a [`RenderPort`] that whoever services the
/// device renders from. Serves tests, offline bouncing, AudioWorklet hosts,
/// and C hosts that run their own device callback.
#[derive(Clone)]
pub struct OfflineBackend {
    inner: Rc<OfflineControl>,
}

impl OfflineBackend {
    pub fn new(sample_rate: f64, max_block: usize) -> (Self, RenderPort) {
        let (link, port) = render_link(max_block);
        let backend = Self {
            inner: Rc::new(OfflineControl {
                sample_rate,
                availability: Cell::new(Availability::Available),
                link,
            }),
        };
        (backend, port)
    }

    pub fn set_availability(&self, availability: Availability) {
        self.inner.availability.set(availability);
    }

    pub fn is_running(&self) -> bool {
        self.inner.link.is_running()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.inner.link.frames_rendered()
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.sample_rate
    }
}

impl AudioBackend for OfflineBackend {
    fn open(&mut self) -> Result<f64, BackendError> {
        let sample_rate = self.inner.sample_rate;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(BackendError::InvalidSampleRate);
        }
        match self.inner.availability.get() {
            Availability::NoDevice => Err(BackendError::NoOutputDevice),
            _ => Ok(sample_rate),
        }
    }

    fn resume(&mut self) -> Result<(), BackendError> {
        match self.inner.availability.get() {
            Availability::Available => {
                self.inner.link.set_running(true);
                Ok(())
            }
            Availability::NoDevice => Err(BackendError::NoOutputDevice),
            Availability::GestureRequired => Err(BackendError::GestureRequired),
        }
    }

    fn suspend(&mut self) {
        self.inner.link.set_running(false);
    }

    fn attach(&mut self, graph: ToneGraph) {
        self.inner.link.send(RackCommand::Attach(graph));
    }

    fn detach(&mut self) {
        self.inner.link.send(RackCommand::Clear);
    }
}
