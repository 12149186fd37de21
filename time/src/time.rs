use app::core_stage::CoreStage;
use app::plugin::{Plugin, PluginAppAccess};
use bevy_ecs::prelude::*;
use std::time::{Duration, Instant};

/// Frame clock. The host advances it once per display refresh, either from its
/// own timestamps or from the wall clock.
#[derive(Resource)]
pub struct Time {
    delta: Duration,
    delta_seconds: f64,
    elapsed: Duration,
    start_time: Instant,
}

impl Time {
    pub fn new() -> Time {
        Time {
            delta: Duration::from_secs(0),
            delta_seconds: 0.0,
            elapsed: Duration::from_secs(0),
            start_time: Instant::now(),
        }
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f32 {
        self.delta_seconds as f32
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Uses the wall clock since the session started.
    pub fn update(&mut self) {
        let now = self.start_time.elapsed();
        self.advance_to(now);
    }

    /// Moves to a host supplied timestamp. Timestamps that go backwards give a zero delta.
    pub fn advance_to(&mut self, timestamp: Duration) {
        self.delta = timestamp.saturating_sub(self.elapsed);
        self.delta_seconds = self.delta.as_secs_f64();
        self.elapsed = self.elapsed.max(timestamp);
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame counter with a smoothed frames-per-second estimate.
#[derive(Resource, Debug, Default, Clone, PartialEq)]
pub struct FrameStats {
    pub frame_count: u64,
    pub frames_per_second: f32,
}

impl FrameStats {
    const SMOOTHING: f32 = 0.1;

    pub fn record(&mut self, delta_seconds: f32) {
        self.frame_count += 1;
        if delta_seconds <= 0.0 {
            return;
        }

        let instant_fps = 1.0 / delta_seconds;
        if self.frames_per_second == 0.0 {
            self.frames_per_second = instant_fps;
        } else {
            self.frames_per_second += (instant_fps - self.frames_per_second) * Self::SMOOTHING;
        }
    }
}

fn update_frame_stats(time: Res<Time>, mut stats: ResMut<FrameStats>) {
    stats.record(time.delta_seconds());
}

pub struct TimePlugin;

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimePluginSet {
    UpdateStats,
}

impl Plugin for TimePlugin {
    fn build(&mut self, app: &mut PluginAppAccess) {
        app.with_resource(Time::new())
            .with_resource(FrameStats::default())
            .with_staged_system(
                CoreStage::StartFrame,
                update_frame_stats.in_set(TimePluginSet::UpdateStats),
            );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_to_host_timestamps() {
        let mut time = Time::new();
        time.advance_to(Duration::from_millis(16));
        assert_eq!(time.delta(), Duration::from_millis(16));

        time.advance_to(Duration::from_millis(48));
        assert_eq!(time.delta(), Duration::from_millis(32));
        assert_eq!(time.elapsed(), Duration::from_millis(48));

        time.advance_to(Duration::from_millis(40));
        assert_eq!(time.delta(), Duration::ZERO);
        assert_eq!(time.elapsed(), Duration::from_millis(48));
    }

    #[test]
    fn test_frame_stats_smooths_fps() {
        let mut stats = FrameStats::default();
        stats.record(0.0);
        assert_eq!(stats.frame_count, 1);
        assert_eq!(stats.frames_per_second, 0.0);

        stats.record(1.0 / 60.0);
        assert!((stats.frames_per_second - 60.0).abs() < 0.01);

        stats.record(1.0 / 30.0);
        assert!(stats.frames_per_second < 60.0 && stats.frames_per_second > 30.0);
        assert_eq!(stats.frame_count, 3);
    }
}
