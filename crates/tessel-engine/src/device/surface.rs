use wgpu::SurfaceError;
use winit::dpi::PhysicalSize;

use super::GpuInit;

/// What the viewer does after a failed frame acquire.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Swapchain was reconfigured; the next frame may render.
    Reconfigured,
    /// Transient; drop this frame only.
    SkipFrame,
    /// Out of memory; the viewer exits.
    Fatal,
}

pub(crate) fn action_for(err: &SurfaceError) -> SurfaceErrorAction {
    match err {
        SurfaceError::Lost | SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
        SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
        SurfaceError::Timeout | SurfaceError::Other => SurfaceErrorAction::SkipFrame,
    }
}

/// Picks the first format matching the sRGB preference, else the first offered.
pub(crate) fn choose_surface_format(
    formats: &[wgpu::TextureFormat],
    prefer_srgb: bool,
) -> Option<wgpu::TextureFormat> {
    formats
        .iter()
        .copied()
        .find(|f| f.is_srgb() == prefer_srgb)
        .or_else(|| formats.first().copied())
}

pub(crate) fn choose_alpha_mode(
    caps: &wgpu::SurfaceCapabilities,
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| caps.alpha_modes.contains(m))
        .or_else(|| caps.alpha_modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Swapchain configuration for a window of `size`, or None when the surface
/// offers no formats.
pub(crate) fn surface_config(
    caps: &wgpu::SurfaceCapabilities,
    size: PhysicalSize<u32>,
    init: &GpuInit,
) -> Option<wgpu::SurfaceConfiguration> {
    Some(wgpu::SurfaceConfiguration {
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        format: choose_surface_format(&caps.formats, init.prefer_srgb)?,
        width: size.width.max(1),
        height: size.height.max(1),
        present_mode: init.present_mode,
        alpha_mode: choose_alpha_mode(caps, init.alpha_mode),
        view_formats: vec![],
        desired_maximum_frame_latency: init.desired_maximum_frame_latency,
    })
}

/// Records `new_size` and reconfigures unless the window is minimised.
pub(crate) fn apply_resize(
    surface: &wgpu::Surface,
    device: &wgpu::Device,
    config: &mut wgpu::SurfaceConfiguration,
    size: &mut PhysicalSize<u32>,
    new_size: PhysicalSize<u32>,
) {
    *size = new_size;
    if new_size.width == 0 || new_size.height == 0 {
        return;
    }
    config.width = new_size.width;
    config.height = new_size.height;
    surface.configure(device, config);
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::CompositeAlphaMode as Alpha;
    use wgpu::TextureFormat as F;

    fn caps(formats: Vec<F>, alpha_modes: Vec<Alpha>) -> wgpu::SurfaceCapabilities {
        wgpu::SurfaceCapabilities {
            formats,
            present_modes: vec![wgpu::PresentMode::Fifo],
            alpha_modes,
            usages: wgpu::TextureUsages::RENDER_ATTACHMENT,
        }
    }

    // ── formats ──

    #[test]
    fn surface_format_follows_srgb_preference() {
        let offered = [F::Bgra8UnormSrgb, F::Bgra8Unorm, F::Rgba16Float];
        assert_eq!(choose_surface_format(&offered, false), Some(F::Bgra8Unorm));
        assert_eq!(choose_surface_format(&offered, true), Some(F::Bgra8UnormSrgb));
    }

    #[test]
    fn surface_format_falls_back_to_first() {
        assert_eq!(
            choose_surface_format(&[F::Bgra8UnormSrgb], false),
            Some(F::Bgra8UnormSrgb)
        );
        assert_eq!(choose_surface_format(&[], true), None);
    }

    // ── configuration ──

    #[test]
    fn config_uses_defaults_and_clamps_minimised_size() {
        let caps = caps(vec![F::Bgra8UnormSrgb, F::Bgra8Unorm], vec![Alpha::Opaque]);
        let config = surface_config(&caps, PhysicalSize::new(0, 480), &GpuInit::default())
            .expect("formats offered");
        assert_eq!(config.format, F::Bgra8Unorm);
        assert_eq!((config.width, config.height), (1, 480));
        assert_eq!(config.present_mode, wgpu::PresentMode::Fifo);
        assert_eq!(config.alpha_mode, Alpha::Opaque);
        assert_eq!(config.desired_maximum_frame_latency, 2);
    }

    #[test]
    fn unsupported_alpha_request_falls_back() {
        let caps = caps(vec![F::Bgra8Unorm], vec![Alpha::Opaque, Alpha::PreMultiplied]);
        let init = GpuInit {
            alpha_mode: Some(Alpha::PostMultiplied),
            ..GpuInit::default()
        };
        let config = surface_config(&caps, PhysicalSize::new(64, 64), &init).expect("formats");
        assert_eq!(config.alpha_mode, Alpha::Opaque);

        let init = GpuInit {
            alpha_mode: Some(Alpha::PreMultiplied),
            ..GpuInit::default()
        };
        let config = surface_config(&caps, PhysicalSize::new(64, 64), &init).expect("formats");
        assert_eq!(config.alpha_mode, Alpha::PreMultiplied);
    }

    #[test]
    fn no_formats_means_no_config() {
        let caps = caps(vec![], vec![]);
        assert!(surface_config(&caps, PhysicalSize::new(64, 64), &GpuInit::default()).is_none());
    }

    // ── errors ──

    #[test]
    fn surface_errors_map_to_actions() {
        use SurfaceError as E;
        assert_eq!(action_for(&E::Lost), SurfaceErrorAction::Reconfigured);
        assert_eq!(action_for(&E::Outdated), SurfaceErrorAction::Reconfigured);
        assert_eq!(action_for(&E::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(action_for(&E::Other), SurfaceErrorAction::SkipFrame);
        assert_eq!(action_for(&E::OutOfMemory), SurfaceErrorAction::Fatal);
    }
}
