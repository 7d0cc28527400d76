// Example runner for the `fall_sentinel` library: synthesizes a person standing,
// falling and lying still, feeds it through the pipeline and prints every event.
//
// Usage: fall_sentinel [default|sensitive]

use fall_sentinel::core_modules::landmark::landmark::{
    LEFT_HIP, LEFT_SHOULDER, NOSE, RIGHT_HIP, RIGHT_SHOULDER,
};
use fall_sentinel::{
    ConfigError, DetectorConfig, EventClock, FallPipeline, NormalizedLandmark, Profile, Report,
};
use std::env;

const TICK_MS: u64 = 33;

fn main() -> Result<(), ConfigError> {
    let profile: Profile = match env::args().nth(1) {
        Some(name) => name.parse()?,
        None => Profile::Default,
    };
    println!("Fall Sentinel - Example Runner ({profile} profile)");

    let mut pipeline = FallPipeline::new(DetectorConfig::profile(profile), EventClock::starting_now(0));

    let mut now: u64 = 0;
    while now <= 8_000 {
        let progress = (now.saturating_sub(1_500) as f64 / 450.0).min(1.0);
        let landmarks = pose(0.2 + 0.55 * progress, 85.0 * progress);

        if let Report::FallDetected { event, .. } = pipeline.process(&landmarks, now) {
            match serde_json::to_string_pretty(&event) {
                Ok(json) => println!("{json}"),
                Err(err) => eprintln!("could not encode event: {err}"),
            }
        }
        now += TICK_MS;
    }

    let stats = pipeline.stats();
    println!(
        "{} ticks, {} status changes, {} event(s), final status {:?}",
        stats.ticks,
        stats.transitions,
        stats.events,
        pipeline.status()
    );
    Ok(())
}

/// A minimal skeleton: nose at `head_y`, torso leaning `tilt_deg` around the hips.
fn pose(head_y: f64, tilt_deg: f64) -> Vec<NormalizedLandmark> {
    let hip_y = 0.55;
    let radians = tilt_deg.to_radians();
    let shoulder_x = 0.5 - 0.25 * radians.sin();
    let shoulder_y = hip_y - 0.25 * radians.cos();

    let mut landmarks = vec![NormalizedLandmark::new(0.5, 0.5); 33];
    landmarks[NOSE] = NormalizedLandmark::new(0.5, head_y);
    landmarks[LEFT_SHOULDER] = NormalizedLandmark::new(shoulder_x - 0.05, shoulder_y);
    landmarks[RIGHT_SHOULDER] = NormalizedLandmark::new(shoulder_x + 0.05, shoulder_y);
    landmarks[LEFT_HIP] = NormalizedLandmark::new(0.45, hip_y);
    landmarks[RIGHT_HIP] = NormalizedLandmark::new(0.55, hip_y);
    landmarks
}
