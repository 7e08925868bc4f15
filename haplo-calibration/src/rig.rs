use haplo_core::Viewport;

/// Physical monitor dimensions of the haploscope displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSpec {
    pub px_width: u32,
    pub px_height: u32,
    pub mm_width: u32,
    pub mm_height: u32,
}

impl MonitorSpec {
    pub const fn px_per_mm(&self) -> (f64, f64) {
        (
            self.px_width as f64 / self.mm_width as f64,
            self.px_height as f64 / self.mm_height as f64,
        )
    }
}

pub const MONITOR_SPEC: MonitorSpec = MonitorSpec {
    px_width: 3840,
    px_height: 2160,
    mm_width: 343,
    mm_height: 187,
};

/// Visible region of the left-eye monitor after the mirror cut-off.
pub const LEFT_VIEWPORT: Viewport =
    Viewport::from_bounds(0, 218, MONITOR_SPEC.px_width, MONITOR_SPEC.px_height);

pub const RIGHT_VIEWPORT: Viewport = Viewport::from_bounds(
    MONITOR_SPEC.px_width - 55,
    210,
    MONITOR_SPEC.px_width,
    MONITOR_SPEC.px_height,
);

/// Rig refresh timer period in milliseconds.
pub const TIMER_MS: f64 = 33.3;
