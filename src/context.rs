//! The rendering context state machine.
//!
//! A context moves through `UNCREATED -> CURRENT <-> RELEASED -> DESTROYED`.
//! The native context is created lazily on the first successful make-current,
//! which is also the moment share-group wiring happens: if a sibling in the
//! context's share group already exists, its native handle is passed to the
//! creation call so sharing is established atomically.
//!
//! Operations that arrive while the context cannot act (another thread holds
//! it, the surface is not realized yet) are either refused with the
//! recoverable `Ok(false)` sentinel or parked in one pending-operation queue
//! that is drained at the start of every [`Context::invoke`].

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use crate::api::{Driver, RawContext};
use crate::display::{Display, ReleasePolicy};
use crate::error::{ErrorKind, Result};
use crate::proc_table::{self, CoreEntryPoints, FunctionAvailabilityCache, ProcTable};
use crate::surface::Surface;

thread_local! {
    /// The stack of contexts entered through [`Context::invoke`] on this
    /// thread. The top entry is the context currently bound to the thread.
    static CURRENT_STACK: RefCell<Vec<Arc<ContextInner>>> = const { RefCell::new(Vec::new()) };
}

/// A rendering context bound to one drawable surface.
///
/// The handle is cheap to clone and can be passed between threads; the
/// underlying native context is still current on at most one thread at a
/// time.
#[derive(Debug, Clone)]
pub struct Context {
    pub(crate) inner: Arc<ContextInner>,
}

impl Display {
    /// Create a context for the surface, in the uncreated state.
    ///
    /// When `share_with` is given both contexts are placed in one share
    /// group, irrespective of whether either of them exists natively yet;
    /// the native wiring happens at creation time through whichever group
    /// member is created first.
    pub fn create_context(&self, surface: &Surface, share_with: Option<&Context>) -> Result<Context> {
        if surface.display() != self {
            return Err(ErrorKind::BadSurface.into());
        }

        let context = Context {
            inner: Arc::new(ContextInner {
                display: self.clone(),
                surface: surface.clone(),
                raw: AtomicU64::new(0),
                lifecycle: Mutex::new(Lifecycle::default()),
                gl: Mutex::new(None),
            }),
        };

        if let Some(share) = share_with {
            if share.inner.display != *self {
                return Err(ErrorKind::BadContext.into());
            }
            self.share_registry().register_sharing(&context.inner, &share.inner);
            log::debug!("registered sharing between {:?} and {:?}", context.inner, share.inner);
        }

        Ok(context)
    }
}

impl Context {
    /// Make the context current on the calling thread, creating the native
    /// context on first use.
    ///
    /// Returns `Ok(false)` when the context cannot be acquired right now and
    /// the caller should abort the frame and retry later: the surface is not
    /// realized yet, or another thread currently holds the context. Native
    /// failures are fatal errors carrying the platform error code.
    pub fn make_current(&self) -> Result<bool> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        self.inner.make_current_locked(&mut lifecycle)
    }

    /// Detach the context from the calling thread without destroying it.
    pub fn release(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        self.inner.release_locked(&mut lifecycle)?;
        self.inner.run_deferred_destroy(&mut lifecycle)
    }

    /// Destroy the native context.
    ///
    /// Destroying is idempotent; the second and every following call is a
    /// no-op. When another thread holds the context the destroy is deferred
    /// and runs once that thread relinquishes it.
    pub fn destroy(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();

        match lifecycle.state {
            State::Destroyed => Ok(()),
            State::Uncreated => {
                // Nothing native exists; the context just becomes unusable.
                lifecycle.state = State::Destroyed;
                Ok(())
            },
            State::Created(_) if lifecycle.held_by_other_thread() => {
                if !lifecycle.pending.contains(&PendingOp::Destroy) {
                    log::debug!("deferring destroy of {:?}, held by another thread", self.inner);
                    lifecycle.pending.push_back(PendingOp::Destroy);
                }
                Ok(())
            },
            State::Created(_) => self.inner.destroy_locked(&mut lifecycle),
        }
    }

    /// Whether the native context has been created.
    pub fn is_created(&self) -> bool {
        matches!(self.inner.lifecycle.lock().unwrap().state, State::Created(_))
    }

    /// Whether the context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        self.inner.lifecycle.lock().unwrap().current_on == Some(thread::current().id())
    }

    /// The raw native context handle, once created.
    pub fn raw_context(&self) -> Option<u64> {
        match self.inner.raw.load(Ordering::Acquire) {
            0 => None,
            raw => Some(raw),
        }
    }

    /// The surface the context renders to.
    pub fn surface(&self) -> &Surface {
        &self.inner.surface
    }

    /// Claim or relinquish the rendering-thread affinity for the calling
    /// thread.
    ///
    /// With affinity claimed the context stays current on that thread across
    /// frames and no other thread can acquire it. Claiming while claimed, or
    /// relinquishing while not claimed by the calling thread, is a contract
    /// violation. Relinquishing drains operations that were deferred while
    /// the affinity was held.
    pub fn set_rendering_thread(&self, on: bool) -> Result<()> {
        let me = thread::current().id();
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();

        if on {
            if lifecycle.rendering_thread.is_some() {
                return Err(ErrorKind::BadContextState.into());
            }
            lifecycle.rendering_thread = Some(me);
            Ok(())
        } else {
            if lifecycle.rendering_thread != Some(me) {
                return Err(ErrorKind::BadContextState.into());
            }
            lifecycle.rendering_thread = None;
            // A no-op pass over the queue so a destroy that was parked
            // behind the affinity finally runs.
            self.inner.drain_pending_locked(&mut lifecycle)
        }
    }

    /// Ask for the surface to be resized to `width` x `height` pixels.
    ///
    /// The resize is applied on the owning thread the next time the context
    /// is invoked. A later request supersedes an unapplied earlier one.
    pub fn request_resize(&self, width: u32, height: u32) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        lifecycle.pending.retain(|op| !matches!(op, PendingOp::Resize(..)));
        lifecycle.pending.push_back(PendingOp::Resize(width, height));
    }

    /// Note that the surface may have become realized, so the next invoke
    /// attempts creation again.
    pub fn request_realize(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        if !lifecycle.pending.contains(&PendingOp::Realize) {
            lifecycle.pending.push_back(PendingOp::Realize);
        }
    }

    /// Run `action` with the context current on the calling thread.
    ///
    /// Pending operations are drained first. Returns `Ok(None)` when the
    /// frame must be aborted and retried later (surface not realized,
    /// context held elsewhere, or a drained destroy consumed the context).
    ///
    /// Invokes nest: an action may invoke another context, which is made
    /// current for the inner action and the previous context re-established
    /// afterwards, also when the inner action panics. Nesting the same
    /// context short-circuits without a redundant make-current/release
    /// cycle.
    pub fn invoke<T>(&self, action: impl FnOnce(&Context) -> T) -> Result<Option<T>> {
        {
            let mut lifecycle = self.inner.lifecycle.lock().unwrap();
            self.inner.drain_pending_locked(&mut lifecycle)?;
            if matches!(lifecycle.state, State::Destroyed) {
                return Ok(None);
            }
        }

        let same_context = CURRENT_STACK.with(|stack| {
            stack.borrow().last().map_or(false, |top| Arc::ptr_eq(top, &self.inner))
        });
        if same_context {
            return Ok(Some(action(self)));
        }

        if !self.make_current()? {
            return Ok(None);
        }

        CURRENT_STACK.with(|stack| stack.borrow_mut().push(Arc::clone(&self.inner)));
        let _guard = StackGuard { context: Arc::clone(&self.inner) };

        Ok(Some(action(self)))
    }

    /// Set the swap interval of the context. The context must be current on
    /// the calling thread.
    pub fn set_swap_interval(&self, interval: u32) -> Result<()> {
        let lifecycle = self.inner.lifecycle.lock().unwrap();
        if lifecycle.current_on != Some(thread::current().id()) {
            return Err(ErrorKind::BadContextState.into());
        }
        let State::Created(raw) = lifecycle.state else {
            return Err(ErrorKind::BadContextState.into());
        };

        self.inner.driver().set_swap_interval(raw, interval)
    }

    /// The window system extension string of the platform.
    pub fn platform_extensions_string(&self) -> String {
        self.inner.driver().platform_extensions()
    }

    /// Resolve the address of a GL function for this context.
    ///
    /// Returns null for unavailable functions; availability is queried
    /// separately through [`Context::is_function_available`].
    pub fn get_proc_address(&self, name: &str) -> *const c_void {
        if CoreEntryPoints::contains(name) {
            return proc_table::core_entry_points(self.inner.driver()).get(name);
        }

        let gl = self.inner.gl.lock().unwrap();
        match gl.as_ref() {
            Some(gl) => match crate::proc_table::Command::from_symbol(name) {
                Some(command) => gl.table.get(command),
                // Not a declared slot; fall through to the driver lookup.
                None => {
                    let driver = self.inner.driver();
                    let native = driver.map_symbol(name).unwrap_or(name);
                    driver.get_proc_address(native)
                },
            },
            // No native context yet, nothing is resolvable.
            None => std::ptr::null(),
        }
    }

    /// Whether the named GL function can be called on this context.
    pub fn is_function_available(&self, name: &str) -> bool {
        if CoreEntryPoints::contains(name) {
            return true;
        }

        let gl = self.inner.gl.lock().unwrap();
        match gl.as_ref() {
            Some(gl) => gl.cache.is_function_available(name, &gl.table),
            None => false,
        }
    }

    /// Whether the named extension is reported by this context.
    pub fn is_extension_available(&self, name: &str) -> bool {
        let gl = self.inner.gl.lock().unwrap();
        gl.as_ref().map_or(false, |gl| gl.cache.is_extension_available(name))
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

/// Pops the invoke stack and re-establishes the previously current context,
/// also when the action unwinds.
struct StackGuard {
    context: Arc<ContextInner>,
}

impl Drop for StackGuard {
    fn drop(&mut self) {
        CURRENT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let top = stack.pop();
            debug_assert!(top.map_or(false, |top| Arc::ptr_eq(&top, &self.context)));

            {
                let mut lifecycle = self.context.lifecycle.lock().unwrap();
                if let Err(err) = self.context.release_locked(&mut lifecycle) {
                    log::error!("failed to release {:?}: {err}", self.context);
                }
                if let Err(err) = self.context.run_deferred_destroy(&mut lifecycle) {
                    log::error!("deferred destroy of {:?} failed: {err}", self.context);
                }
            }

            // Restore whatever was current before this invoke.
            if let Some(previous) = stack.last() {
                let mut lifecycle = previous.lifecycle.lock().unwrap();
                match previous.make_current_locked(&mut lifecycle) {
                    Ok(true) => (),
                    Ok(false) => {
                        log::error!("previous context {:?} could not be restored", previous)
                    },
                    Err(err) => log::error!("failed to restore {:?}: {err}", previous),
                }
            }
        });
    }
}

pub(crate) struct ContextInner {
    display: Display,
    surface: Surface,

    /// Mirror of the created native handle, readable without taking the
    /// lifecycle lock. Zero while no native context exists. Share-group
    /// lookups go through this to avoid locking a sibling's lifecycle.
    raw: AtomicU64,

    lifecycle: Mutex<Lifecycle>,

    /// Entry point table and extension cache, rebuilt wholesale on every
    /// native creation.
    gl: Mutex<Option<GlState>>,
}

impl fmt::Debug for ContextInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("raw", &self.raw.load(Ordering::Relaxed))
            .field("surface", &self.surface.raw())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: State,
    current_on: Option<ThreadId>,
    rendering_thread: Option<ThreadId>,
    pending: VecDeque<PendingOp>,
}

impl Lifecycle {
    fn held_by_other_thread(&self) -> bool {
        let me = thread::current().id();
        self.current_on.map_or(false, |owner| owner != me)
            || self.rendering_thread.map_or(false, |owner| owner != me)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    #[default]
    Uncreated,
    Created(RawContext),
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    Realize,
    Resize(u32, u32),
    Destroy,
}

#[derive(Debug)]
struct GlState {
    table: ProcTable,
    cache: FunctionAvailabilityCache,
}

impl ContextInner {
    fn driver(&self) -> &dyn Driver {
        self.display.driver()
    }

    pub(crate) fn display(&self) -> &Display {
        &self.display
    }

    pub(crate) fn raw_created(&self) -> Option<RawContext> {
        match self.raw.load(Ordering::Acquire) {
            0 => None,
            raw => Some(RawContext(raw)),
        }
    }

    fn make_current_locked(&self, lifecycle: &mut Lifecycle) -> Result<bool> {
        let me = thread::current().id();

        if matches!(lifecycle.state, State::Destroyed) {
            return Err(ErrorKind::BadContext.into());
        }

        if lifecycle.rendering_thread.map_or(false, |owner| owner != me) {
            log::trace!("{self:?} is bound to another rendering thread, deferring");
            return Ok(false);
        }

        if let Some(owner) = lifecycle.current_on {
            if owner == me {
                // Logically current, but a nested invoke or a held release
                // may have left the driver bound elsewhere.
                if let State::Created(raw) = lifecycle.state {
                    if self.driver().current_context() != Some(raw) {
                        self.driver().make_current(raw, self.surface.raw())?;
                    }
                }
                return Ok(true);
            }
            log::trace!("{self:?} is current on another thread, deferring");
            return Ok(false);
        }

        if !self.driver().surface_realized(self.surface.raw()) {
            log::trace!("surface of {self:?} is not realized yet, deferring");
            return Ok(false);
        }

        let mut created_now = false;
        let raw = match lifecycle.state {
            State::Created(raw) => raw,
            State::Uncreated => {
                // Wire sharing through an already created sibling; a context
                // that does not exist natively cannot be a share source.
                let share = self
                    .display
                    .share_registry()
                    .share_context_for(self)
                    .and_then(|sibling| sibling.raw_created());

                let raw = self.driver().create_context(
                    self.surface.raw(),
                    self.surface.config().format(),
                    share,
                )?;

                lifecycle.state = State::Created(raw);
                self.raw.store(raw.0, Ordering::Release);
                created_now = true;
                log::debug!("created native context {raw:?} (share source: {share:?})");
                raw
            },
            State::Destroyed => unreachable!(),
        };

        self.driver().make_current(raw, self.surface.raw())?;
        lifecycle.current_on = Some(me);

        if created_now {
            self.display.share_registry().context_created(self);
            self.reset_gl_function_availability();
        }

        Ok(true)
    }

    fn release_locked(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        let me = thread::current().id();
        if lifecycle.current_on != Some(me) {
            return Err(ErrorKind::BadAccess.into());
        }
        let State::Created(raw) = lifecycle.state else {
            return Err(ErrorKind::BadContextState.into());
        };

        // Skipping the native release while this context stays the active
        // one works around drivers that stall on repeated rebinds. The
        // bookkeeping below still records the context as released.
        let skip_native = self.display.release_policy() == ReleasePolicy::Hold
            && self.driver().current_context() == Some(raw);
        if !skip_native {
            self.driver().release_current()?;
        }

        lifecycle.current_on = None;
        Ok(())
    }

    /// Run a destroy that was parked while the calling thread held the
    /// context. Call after the hold was given up.
    fn run_deferred_destroy(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        if !lifecycle.pending.contains(&PendingOp::Destroy) || lifecycle.held_by_other_thread() {
            return Ok(());
        }

        lifecycle.pending.retain(|op| *op != PendingOp::Destroy);
        if matches!(lifecycle.state, State::Created(_)) {
            self.destroy_locked(lifecycle)?;
        }
        Ok(())
    }

    fn destroy_locked(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        let State::Created(raw) = lifecycle.state else {
            return Ok(());
        };

        if lifecycle.current_on == Some(thread::current().id()) {
            self.driver().release_current()?;
            lifecycle.current_on = None;
        }

        self.driver().destroy_context(raw)?;
        self.display.share_registry().context_destroyed(self);
        lifecycle.state = State::Destroyed;
        self.raw.store(0, Ordering::Release);
        *self.gl.lock().unwrap() = None;
        log::debug!("destroyed native context {raw:?}");

        Ok(())
    }

    fn drain_pending_locked(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        while let Some(op) = lifecycle.pending.pop_front() {
            match op {
                PendingOp::Realize => {
                    log::trace!(
                        "drained realize request, surface realized: {}",
                        self.driver().surface_realized(self.surface.raw())
                    );
                },
                PendingOp::Resize(width, height) => {
                    self.driver().resize_surface(self.surface.raw(), width, height)?;
                },
                PendingOp::Destroy => {
                    if lifecycle.held_by_other_thread() {
                        // Still busy; park it again.
                        lifecycle.pending.push_front(PendingOp::Destroy);
                        return Ok(());
                    }
                    self.destroy_locked(lifecycle)?;
                    return Ok(());
                },
            }
        }
        Ok(())
    }

    /// Rebuild the entry point table and extension cache. The native context
    /// must be current on the calling thread.
    fn reset_gl_function_availability(&self) {
        let driver = self.driver();
        proc_table::core_entry_points(driver);
        let table = ProcTable::load(driver);
        let cache = FunctionAvailabilityCache::load(driver);
        *self.gl.lock().unwrap() = Some(GlState { table, cache });
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        let lifecycle = match self.lifecycle.get_mut() {
            Ok(lifecycle) => lifecycle,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let State::Created(raw) = lifecycle.state {
            if let Err(err) = self.display.driver().destroy_context(raw) {
                log::warn!("failed to destroy native context {raw:?}: {err}");
            }
        }
    }
}
