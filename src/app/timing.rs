use std::time::{Duration, Instant};
use winit::window::Window;

const DEFAULT_FRAME: Duration = Duration::from_millis(16);
const TITLE_REFRESH_SECS: f32 = 0.5;
/// Longest step, in seconds, that frame-rate-scaled motion may take.
const MAX_FRAME_DT: f32 = 0.1;

/// Redraw interval for a monitor refresh rate in millihertz.
pub fn frame_duration_for_refresh(millihz: Option<u32>) -> Duration {
    match millihz {
        Some(millihz) if millihz > 1000 => Duration::from_secs_f32(1000.0 / millihz as f32),
        _ => DEFAULT_FRAME,
    }
}

pub fn frame_duration_for_window(window: &Window) -> Duration {
    frame_duration_for_refresh(
        window
            .current_monitor()
            .and_then(|monitor| monitor.refresh_rate_millihertz()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub fps: f32,
    pub cadence_ms: f32,
    pub paint_ms: f32,
}

pub struct FrameTiming {
    last_frame_time: Option<Instant>,
    last_stats_time: Instant,
    frame_count: u32,
    pub frame_dt: f32,
    paint_ms: f32,
    base_title: String,
}

impl FrameTiming {
    pub fn new(base_title: impl Into<String>, now: Instant) -> Self {
        Self {
            last_frame_time: None,
            last_stats_time: now,
            frame_count: 0,
            frame_dt: DEFAULT_FRAME.as_secs_f32(),
            paint_ms: 0.0,
            base_title: base_title.into(),
        }
    }

    pub fn base_title(&self) -> &str {
        &self.base_title
    }

    pub fn set_paint_ms(&mut self, paint_ms: f32) {
        self.paint_ms = paint_ms;
    }

    /// Records a frame. Returns fresh stats about twice a second.
    pub fn tick(&mut self, now: Instant) -> Option<FrameStats> {
        let dt = match self.last_frame_time {
            Some(last) => now.saturating_duration_since(last),
            None => DEFAULT_FRAME,
        };
        self.last_frame_time = Some(now);
        // A stalled frame (dialog open, window dragged) must not turn into one
        // huge orbit step.
        self.frame_dt = dt.as_secs_f32().min(MAX_FRAME_DT);

        self.frame_count = self.frame_count.saturating_add(1);
        let elapsed = now.saturating_duration_since(self.last_stats_time).as_secs_f32();
        if elapsed < TITLE_REFRESH_SECS {
            return None;
        }
        let stats = FrameStats {
            fps: self.frame_count as f32 / elapsed,
            cadence_ms: self.frame_dt * 1000.0,
            paint_ms: self.paint_ms,
        };
        self.frame_count = 0;
        self.last_stats_time = now;
        Some(stats)
    }

    pub fn update(&mut self, window: Option<&Window>, now: Instant) {
        if let (Some(stats), Some(window)) = (self.tick(now), window) {
            window.set_title(&self.title(&stats));
        }
    }

    pub fn title(&self, stats: &FrameStats) -> String {
        format!(
            "{} - {:.1} fps (cadence {:.2} ms, ui {:.2} ms)",
            self.base_title, stats.fps, stats.cadence_ms, stats.paint_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{frame_duration_for_refresh, FrameTiming, MAX_FRAME_DT};
    use std::time::{Duration, Instant};

    #[test]
    fn refresh_rate_sets_cadence() {
        let duration = frame_duration_for_refresh(Some(144_000));
        assert!((duration.as_secs_f32() - 1.0 / 144.0).abs() < 1e-6);
        assert_eq!(frame_duration_for_refresh(None), Duration::from_millis(16));
        assert_eq!(frame_duration_for_refresh(Some(500)), Duration::from_millis(16));
    }

    #[test]
    fn stats_are_reported_after_half_a_second() {
        let start = Instant::now();
        let mut timing = FrameTiming::new("canvas-preview", start);
        let mut reported = None;
        for frame in 1..=40u64 {
            if let Some(stats) = timing.tick(start + Duration::from_millis(frame * 16)) {
                reported = Some((frame, stats));
                break;
            }
        }
        let (frame, stats) = reported.expect("stats within 40 frames");
        assert_eq!(frame, 32);
        assert!((stats.cadence_ms - 16.0).abs() < 0.01);
        assert!(stats.fps > 60.0 && stats.fps < 65.0);
        assert!(timing.title(&stats).starts_with("canvas-preview - "));
    }

    #[test]
    fn stalled_frame_is_capped() {
        let start = Instant::now();
        let mut timing = FrameTiming::new("canvas-preview", start);
        timing.tick(start);
        timing.tick(start + Duration::from_secs(2));
        assert_eq!(timing.frame_dt, MAX_FRAME_DT);
        timing.tick(start + Duration::from_millis(2016));
        assert!((timing.frame_dt - 0.016).abs() < 1e-4);
    }
}
