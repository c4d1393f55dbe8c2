//! Lifecycle and negotiation tests against the software backend.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Mutex;
use std::thread;

use raw_window_handle::RawWindowHandle;
use serial_test::serial;

use crate::api::headless::{Device, FormatDescriptor};
use crate::api::RawContext;
use crate::chooser::{CapabilitiesChooser, DefaultCapabilitiesChooser};
use crate::config::{Capabilities, CapabilitiesBuilder, Config, SurfaceTypes};
use crate::context::Context;
use crate::display::{Backend, Display, ReleasePolicy};
use crate::error::ErrorKind;
use crate::surface::{LockStatus, Surface};

fn display() -> (Display, Device) {
    let device = Device::new();
    (Display::new_headless(device.clone()), device)
}

fn window_surface(display: &Display, device: &Device) -> (Surface, RawWindowHandle) {
    let window = device.create_window(800, 600);
    let config = display
        .choose_config(&Capabilities::default(), &DefaultCapabilitiesChooser, Some(window))
        .unwrap();
    let surface = unsafe { display.create_window_surface(&config, window).unwrap() };
    (surface, window)
}

fn context(display: &Display, device: &Device) -> Context {
    let (surface, _) = window_surface(display, device);
    display.create_context(&surface, None).unwrap()
}

/// Returns a fixed index, no matter what is available.
#[derive(Debug)]
struct FixedChooser(usize);

impl CapabilitiesChooser for FixedChooser {
    fn choose(&self, _: &Capabilities, _: &[Capabilities], _: Option<usize>) -> usize {
        self.0
    }
}

/// Fails the test when negotiation consults it at all.
#[derive(Debug)]
struct PanickingChooser;

impl CapabilitiesChooser for PanickingChooser {
    fn choose(&self, _: &Capabilities, _: &[Capabilities], _: Option<usize>) -> usize {
        panic!("the chooser must not be consulted for this surface");
    }
}

/// Remembers the candidate list it was shown.
#[derive(Debug, Default)]
struct RecordingChooser {
    seen: Mutex<Vec<Capabilities>>,
}

impl CapabilitiesChooser for RecordingChooser {
    fn choose(
        &self,
        requested: &Capabilities,
        available: &[Capabilities],
        recommended: Option<usize>,
    ) -> usize {
        *self.seen.lock().unwrap() = available.to_vec();
        DefaultCapabilitiesChooser.choose(requested, available, recommended)
    }
}

// Negotiation.

#[test]
fn default_chooser_takes_the_exact_match() {
    let exact = FormatDescriptor::default();
    let device = Device::builder()
        .formats(vec![
            FormatDescriptor { depth_bits: 16, stencil_bits: 0, ..exact.clone() },
            FormatDescriptor { double_buffer: false, ..exact.clone() },
            exact,
        ])
        .build();
    let display = Display::new_headless(device.clone());
    let window = device.create_window(640, 480);

    let requested = CapabilitiesBuilder::new()
        .with_depth_size(24)
        .with_stencil_size(8)
        .with_double_buffer(true)
        .build();
    let config = display
        .choose_config(&requested, &DefaultCapabilitiesChooser, Some(window))
        .unwrap();

    assert_eq!(config.raw_format(), 3);
    let chosen = config.capabilities();
    assert_eq!(chosen.depth_size(), 24);
    assert_eq!(chosen.stencil_size(), 8);
    assert!(chosen.double_buffer());
}

#[test]
fn chooser_out_of_range_is_fatal() {
    let (display, device) = display();
    let window = device.create_window(640, 480);

    let err = display
        .choose_config(&Capabilities::default(), &FixedChooser(usize::MAX), Some(window))
        .unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::BadChooserIndex);
}

#[test]
fn externally_assigned_format_bypasses_the_chooser() {
    let (display, device) = display();
    let window = device.create_window(640, 480);
    device.assign_external_format(window, 4);

    let config =
        display.choose_config(&Capabilities::default(), &PanickingChooser, Some(window)).unwrap();
    assert_eq!(config.raw_format(), 5);

    // The accepted format also applies cleanly to the surface.
    unsafe { display.create_window_surface(&config, window).unwrap() };
}

#[test]
fn render_to_texture_rectangle_requires_render_to_texture() {
    // Even a display without any pbuffer support must reject the request
    // before it talks to the driver.
    let device = Device::builder().arb_pixel_format(false).build();
    let display = Display::new_headless(device);

    let requested = CapabilitiesBuilder::new()
        .with_surface_types(SurfaceTypes::PBUFFER)
        .with_render_to_texture_rectangle(true)
        .build();
    let err = display.choose_pbuffer_config(&requested).unwrap_err();
    assert!(matches!(err.error_kind(), ErrorKind::BadCapabilities(_)));
}

#[test]
fn pbuffers_require_the_extended_query() {
    let device = Device::builder().arb_pixel_format(false).build();
    let display = Display::new_headless(device);

    let requested =
        CapabilitiesBuilder::new().with_surface_types(SurfaceTypes::PBUFFER).build();
    let err = display.choose_pbuffer_config(&requested).unwrap_err();
    assert!(err.not_supported());
}

#[test]
fn float_pbuffers_prefer_the_arb_flavor() {
    let requested = CapabilitiesBuilder::new()
        .with_float_pixels(true)
        .with_surface_types(SurfaceTypes::PBUFFER)
        .build();

    // Both flavors present: the ARB format (id 10 in the default table)
    // wins over the NV one (id 11).
    let device = Device::builder().arb_float(true).nv_float(true).build();
    let display = Display::new_headless(device);
    let config = display.choose_pbuffer_config(&requested).unwrap();
    assert_eq!(config.raw_format(), 10);

    // Only NV present: its format is picked instead.
    let device = Device::builder().arb_float(false).nv_float(true).build();
    let display = Display::new_headless(device);
    let config = display.choose_pbuffer_config(&requested).unwrap();
    assert_eq!(config.raw_format(), 11);

    // Neither is fatal.
    let device = Device::builder().arb_float(false).nv_float(false).build();
    let display = Display::new_headless(device);
    let err = display.choose_pbuffer_config(&requested).unwrap_err();
    assert!(err.not_supported());
}

#[test]
fn multisampling_switches_to_the_extended_query() {
    let (display, device) = display();
    let window = device.create_window(640, 480);

    // Without multisampling the legacy enumeration runs: coarse candidates,
    // no sample counts, no pbuffer capability visible.
    let chooser = RecordingChooser::default();
    display.choose_config(&Capabilities::default(), &chooser, Some(window)).unwrap();
    let legacy = chooser.seen.lock().unwrap().clone();
    assert!(!legacy.is_empty());
    assert!(legacy.iter().all(|caps| caps.num_samples().is_none()));
    assert!(legacy.iter().all(|caps| !caps.surface_types().contains(SurfaceTypes::PBUFFER)));

    // Requesting samples flips to the precise enumeration.
    let window = device.create_window(640, 480);
    let requested = CapabilitiesBuilder::new().with_multisampling(4).build();
    let chooser = RecordingChooser::default();
    let config = display.choose_config(&requested, &chooser, Some(window)).unwrap();
    let extended = chooser.seen.lock().unwrap().clone();
    assert!(extended.iter().any(|caps| caps.num_samples().is_some()));
    assert_eq!(config.capabilities().num_samples(), Some(4));
}

#[test]
fn pixel_format_is_applied_exactly_once() {
    let (display, device) = display();
    let window = device.create_window(640, 480);
    let config = display
        .choose_config(&Capabilities::default(), &DefaultCapabilitiesChooser, Some(window))
        .unwrap();

    let _surface = unsafe { display.create_window_surface(&config, window).unwrap() };
    let err = unsafe { display.create_window_surface(&config, window).unwrap_err() };
    assert_eq!(err.error_kind(), ErrorKind::PixelFormatAlreadySet);
}

#[test]
fn pixmap_configs_skip_the_chooser() {
    let (display, _device) = display();
    let requested =
        CapabilitiesBuilder::new().with_surface_types(SurfaceTypes::PIXMAP).build();

    let config = display.choose_pixmap_config(&requested).unwrap();
    assert!(!config.capabilities().double_buffer());

    let surface = display.create_pixmap_surface(&config, 256, 256).unwrap();
    assert_eq!(surface.size().unwrap(), (256, 256));
}

// Context lifecycle.

#[test]
fn contexts_are_created_lazily() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    assert!(!ctx.is_created());
    assert_eq!(ctx.raw_context(), None);

    assert!(ctx.make_current().unwrap());
    assert!(ctx.is_created());
    assert!(ctx.is_current());
    let raw = ctx.raw_context().unwrap();
    assert!(device.context_exists(raw));

    ctx.release().unwrap();
    assert!(!ctx.is_current());
    assert!(ctx.is_created());

    // Re-acquiring does not create a second native context.
    assert!(ctx.make_current().unwrap());
    assert_eq!(ctx.raw_context(), Some(raw));
}

#[test]
fn destroy_is_idempotent() {
    let (display, device) = display();
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());
    let raw = ctx.raw_context().unwrap();

    ctx.destroy().unwrap();
    assert!(!ctx.is_created());
    assert!(!device.context_exists(raw));

    // The second destroy is a no-op, not a double free.
    ctx.destroy().unwrap();

    let err = ctx.make_current().unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::BadContext);
}

#[test]
fn unrealized_surfaces_defer_instead_of_failing() {
    let (display, device) = display();
    let (surface, window) = window_surface(&display, &device);
    device.set_window_realized(window, false);

    let ctx = display.create_context(&surface, None).unwrap();
    assert!(!ctx.make_current().unwrap());
    assert!(!ctx.is_created());
    assert_eq!(ctx.invoke(|_| ()).unwrap(), None);

    device.set_window_realized(window, true);
    assert_eq!(ctx.invoke(|_| 7).unwrap(), Some(7));
}

#[test]
#[serial]
fn only_one_thread_holds_a_context() {
    let (display, device) = display();
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());

    let other = ctx.clone();
    let acquired = thread::spawn(move || {
        let acquired = other.make_current().unwrap();
        (acquired, other.is_current())
    })
    .join()
    .unwrap();

    assert_eq!(acquired, (false, false));
    assert!(ctx.is_current());
}

#[test]
#[serial]
fn rendering_thread_affinity_defers_other_threads() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    ctx.set_rendering_thread(true).unwrap();
    assert!(ctx.make_current().unwrap());

    let other = ctx.clone();
    let deferred = thread::spawn(move || !other.make_current().unwrap()).join().unwrap();
    assert!(deferred);

    ctx.release().unwrap();
    ctx.set_rendering_thread(false).unwrap();

    // With the affinity gone another thread can finally take the context.
    let other = ctx.clone();
    let acquired = thread::spawn(move || other.make_current().unwrap()).join().unwrap();
    assert!(acquired);
}

#[test]
#[serial]
fn destroy_defers_while_the_affinity_is_held() {
    let (display, device) = display();
    let ctx = context(&display, &device);
    ctx.set_rendering_thread(true).unwrap();
    assert!(ctx.make_current().unwrap());
    let raw = ctx.raw_context().unwrap();

    let other = ctx.clone();
    thread::spawn(move || other.destroy().unwrap()).join().unwrap();

    // The destroy is parked until the owning thread lets go.
    assert!(ctx.is_created());
    assert!(device.context_exists(raw));

    ctx.set_rendering_thread(false).unwrap();
    assert!(!ctx.is_created());
    assert!(!device.context_exists(raw));
}

#[test]
fn affinity_violations_are_errors() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    ctx.set_rendering_thread(true).unwrap();
    assert!(ctx.set_rendering_thread(true).is_err());

    let other = ctx.clone();
    let errs = thread::spawn(move || {
        (other.set_rendering_thread(true).is_err(), other.set_rendering_thread(false).is_err())
    })
    .join()
    .unwrap();
    assert_eq!(errs, (true, true));

    ctx.set_rendering_thread(false).unwrap();
    assert!(ctx.set_rendering_thread(false).is_err());
}

#[test]
#[serial]
fn destroy_runs_once_the_holding_thread_releases() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    let (acquired_tx, acquired_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let held = ctx.clone();
    let holder = thread::spawn(move || {
        assert!(held.make_current().unwrap());
        acquired_tx.send(held.raw_context().unwrap()).unwrap();
        release_rx.recv().unwrap();
        held.release().unwrap();
    });

    let raw = acquired_rx.recv().unwrap();
    ctx.destroy().unwrap();
    assert!(device.context_exists(raw), "destroy must wait for the holding thread");

    release_tx.send(()).unwrap();
    holder.join().unwrap();
    assert!(!device.context_exists(raw));
    assert!(!ctx.is_created());
}

#[test]
fn resize_is_applied_on_the_next_invoke() {
    let (display, device) = display();
    let (surface, _) = window_surface(&display, &device);
    let ctx = display.create_context(&surface, None).unwrap();

    ctx.request_resize(1024, 768);
    assert_eq!(surface.size().unwrap(), (800, 600));

    ctx.invoke(|_| ()).unwrap().unwrap();
    assert_eq!(surface.size().unwrap(), (1024, 768));
}

#[test]
fn nested_invokes_restore_the_previous_context() {
    let (display, device) = display();
    let a = context(&display, &device);
    let b = context(&display, &device);

    let driver_current =
        |display: &Display| display.driver().current_context().map(|raw| raw.0);

    a.invoke(|a| {
        assert!(a.is_current());

        let inner = b.invoke(|b| {
            assert!(b.is_current());
            assert_eq!(driver_current(b.surface().display()), b.raw_context());
            42
        })
        .unwrap();
        assert_eq!(inner, Some(42));

        // Popping the inner context rebinds this one.
        assert!(a.is_current());
        assert_eq!(driver_current(a.surface().display()), a.raw_context());
    })
    .unwrap()
    .unwrap();
}

#[test]
fn nesting_the_same_context_short_circuits() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    let value = ctx
        .invoke(|outer| {
            let raw = outer.raw_context();
            let inner = outer.invoke(|inner| {
                assert_eq!(inner.raw_context(), raw);
                1
            });
            inner.unwrap().unwrap()
        })
        .unwrap()
        .unwrap();
    assert_eq!(value, 1);
}

#[test]
fn a_panicking_action_still_restores_the_previous_context() {
    let (display, device) = display();
    let a = context(&display, &device);
    let b = context(&display, &device);

    a.invoke(|a| {
        let result = catch_unwind(AssertUnwindSafe(|| {
            b.invoke(|_| -> () { panic!("render action failed") })
        }));
        assert!(result.is_err());

        // The unwound inner invoke put this context back.
        assert!(a.is_current());
        let current = a.surface().display().driver().current_context().map(|raw| raw.0);
        assert_eq!(current, a.raw_context());
    })
    .unwrap()
    .unwrap();
}

#[test]
#[serial]
fn hold_release_policy_skips_the_native_release() {
    let device = Device::new();
    let display = unsafe {
        Display::with_policy(Backend::Headless(device.clone()), ReleasePolicy::Hold).unwrap()
    };
    let ctx = context(&display, &device);

    assert!(ctx.make_current().unwrap());
    let raw = ctx.raw_context().unwrap();
    ctx.release().unwrap();

    // Released in bookkeeping, still bound in the driver.
    assert!(!ctx.is_current());
    assert_eq!(display.driver().current_context(), Some(RawContext(raw)));

    // Under the default policy the driver binding is dropped too.
    let (display, device) = super::tests::display();
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());
    ctx.release().unwrap();
    assert_eq!(display.driver().current_context(), None);
}

// Sharing.

#[test]
fn share_wiring_uses_the_first_created_sibling() {
    let (display, device) = display();
    let (surface_a, _) = window_surface(&display, &device);
    let (surface_b, _) = window_surface(&display, &device);

    let a = display.create_context(&surface_a, None).unwrap();
    let b = display.create_context(&surface_b, Some(&a)).unwrap();

    // A exists first, so it has nothing to share with.
    assert!(a.make_current().unwrap());
    a.release().unwrap();
    assert_eq!(device.share_source(a.raw_context().unwrap()), None);

    // B's creation call receives A's native handle.
    assert!(b.make_current().unwrap());
    assert_eq!(device.share_source(b.raw_context().unwrap()), a.raw_context());
}

#[test]
fn sharing_is_registered_before_either_context_exists() {
    let (display, device) = display();
    let (surface_a, _) = window_surface(&display, &device);
    let (surface_b, _) = window_surface(&display, &device);

    let a = display.create_context(&surface_a, None).unwrap();
    let b = display.create_context(&surface_b, None).unwrap();
    display.register_sharing(&a, &b).unwrap();
    // Repeated registration of the same pair changes nothing.
    display.register_sharing(&a, &b).unwrap();

    // Creation order is the reverse of registration order.
    assert!(b.make_current().unwrap());
    b.release().unwrap();
    assert_eq!(device.share_source(b.raw_context().unwrap()), None);

    assert!(a.make_current().unwrap());
    assert_eq!(device.share_source(a.raw_context().unwrap()), b.raw_context());
}

#[test]
fn destroyed_contexts_stop_being_share_sources() {
    let (display, device) = display();
    let (surface_a, _) = window_surface(&display, &device);
    let (surface_b, _) = window_surface(&display, &device);

    let a = display.create_context(&surface_a, None).unwrap();
    let b = display.create_context(&surface_b, Some(&a)).unwrap();

    assert!(a.make_current().unwrap());
    a.release().unwrap();
    a.destroy().unwrap();

    // A moved to the destroyed partition, so B creates unshared.
    assert!(b.make_current().unwrap());
    assert_eq!(device.share_source(b.raw_context().unwrap()), None);
}

#[test]
fn the_registry_does_not_keep_contexts_alive() {
    let (display, device) = display();
    let (surface_a, _) = window_surface(&display, &device);
    let (surface_b, _) = window_surface(&display, &device);

    let a = display.create_context(&surface_a, None).unwrap();
    let b = display.create_context(&surface_b, Some(&a)).unwrap();

    // B exists natively and would be the share source for A.
    assert!(b.make_current().unwrap());
    b.release().unwrap();

    // Dropping every handle tears B down; the registry holds members
    // weakly, so it cannot resurrect B as a share source.
    drop(b);
    drop(surface_b);
    assert!(a.make_current().unwrap());
    assert_eq!(device.share_source(a.raw_context().unwrap()), None);
}

// Entry points and extensions.

#[test]
fn dynamic_entry_points_resolve_per_context() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    // Nothing is resolvable before the native context exists.
    assert!(ctx.get_proc_address("glGenBuffersARB").is_null());
    assert!(!ctx.is_function_available("glGenBuffersARB"));

    assert!(ctx.make_current().unwrap());

    assert!(!ctx.get_proc_address("glGenBuffersARB").is_null());
    assert!(ctx.is_function_available("glGenBuffersARB"));
    assert!(ctx.is_extension_available("GL_ARB_vertex_buffer_object"));

    // The shader extension is not advertised by the device.
    assert!(ctx.get_proc_address("glCompileShaderARB").is_null());
    assert!(!ctx.is_function_available("glCompileShaderARB"));
    assert!(!ctx.is_extension_available("GL_ARB_shader_objects"));

    // Early core functions are exempt from dynamic resolution.
    assert!(ctx.is_function_available("glGetString"));
    assert!(!ctx.get_proc_address("glGetString").is_null());

    // Unknown names resolve to the null sentinel, not an error.
    assert!(ctx.get_proc_address("glDefinitelyNotReal").is_null());
    assert!(!ctx.is_function_available("glDefinitelyNotReal"));
}

#[test]
fn platform_renamed_symbols_resolve_through_the_mapping() {
    let (display, device) = display();
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());

    // The generic name only resolves because the platform mapping rewrites
    // it; the raw spelling has no native symbol.
    assert!(!ctx.get_proc_address("glAllocateMemoryNV").is_null());
    assert!(display.driver().get_proc_address("glAllocateMemoryNV").is_null());
    assert!(!display.driver().get_proc_address("swAllocateMemoryNV").is_null());
}

#[test]
#[should_panic(expected = "advertised by the driver")]
fn advertised_functions_without_addresses_are_a_bug() {
    let device = Device::builder().suppress_symbol("swAllocateMemoryNV").build();
    let display = Display::new_headless(device.clone());
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());

    // GL_NV_vertex_array_range is advertised but the symbol is gone.
    ctx.is_function_available("glAllocateMemoryNV");
}

#[test]
fn platform_extensions_are_reported() {
    let (display, device) = display();
    let ctx = context(&display, &device);
    assert!(ctx.make_current().unwrap());

    assert!(ctx.platform_extensions_string().contains("SW_ARB_pixel_format"));
    assert!(ctx.is_extension_available("SW_ARB_pbuffer"));
}

#[test]
fn swap_interval_needs_a_current_context() {
    let (display, device) = display();
    let ctx = context(&display, &device);

    assert!(ctx.set_swap_interval(0).is_err());

    assert!(ctx.make_current().unwrap());
    ctx.set_swap_interval(0).unwrap();
    assert_eq!(device.swap_interval(ctx.raw_context().unwrap()), Some(0));
}

// Surfaces.

#[test]
fn surface_locks_are_hold_counted() {
    let (display, device) = display();
    let (surface, window) = window_surface(&display, &device);

    assert_eq!(surface.lock().unwrap(), LockStatus::Ready);
    assert_eq!(surface.lock().unwrap(), LockStatus::Ready);

    surface.unlock().unwrap();
    surface.unlock().unwrap();
    // The hold count is empty now; another unlock is a caller bug.
    assert!(surface.unlock().is_err());

    // A changed native handle is reported on the next outermost lock.
    device.mark_window_changed(window);
    assert_eq!(surface.lock().unwrap(), LockStatus::Changed);
    surface.unlock().unwrap();
}

#[test]
fn locking_an_unrealized_surface_does_not_block() {
    let (display, device) = display();
    let (surface, window) = window_surface(&display, &device);
    device.set_window_realized(window, false);

    assert_eq!(surface.lock().unwrap(), LockStatus::NotReady);
    // Nothing was acquired, so there is nothing to unlock.
    assert!(surface.unlock().is_err());
}

#[test]
fn pbuffer_surfaces_carry_their_texture_binding() {
    let (display, _device) = display();
    let requested = CapabilitiesBuilder::new()
        .with_surface_types(SurfaceTypes::PBUFFER)
        .with_render_to_texture(true)
        .build();

    let config = display.choose_pbuffer_config(&requested).unwrap();
    assert!(config.capabilities().render_to_texture());

    let surface = display.create_pbuffer_surface(&config, 512, 512).unwrap();
    assert_eq!(surface.size().unwrap(), (512, 512));
    assert!(surface.is_realized());
}

#[test]
fn swap_buffers_reaches_the_driver() {
    let (display, device) = display();
    let (surface, window) = window_surface(&display, &device);

    surface.swap_buffers().unwrap();
    surface.swap_buffers().unwrap();
    assert_eq!(device.swap_count(window), 2);
}

#[test]
fn configs_are_display_scoped() {
    let (display_a, device_a) = display();
    let (display_b, _device_b) = display();

    let window = device_a.create_window(640, 480);
    let config: Config = display_a
        .choose_config(&Capabilities::default(), &DefaultCapabilitiesChooser, Some(window))
        .unwrap();

    let err = display_b.create_pixmap_surface(&config, 64, 64).unwrap_err();
    assert_eq!(err.error_kind(), ErrorKind::BadConfig);
}
