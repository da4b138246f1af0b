use crate::predict::Prediction;

/// Longest capture the scheduler will run, in seconds.
pub const MAX_PASS_LENGTH_SECONDS: f64 = 5.0 * 60.0;

/// Drops satellites with tracking disabled, clips long passes symmetrically
/// about their midpoint and re-sorts by start.
pub fn twiddle(predictions: Vec<Prediction>) -> Vec<Prediction> {
    let mut twiddled: Vec<Prediction> = predictions
        .into_iter()
        .filter(|p| !p.satellite.disable_tracking)
        .map(clip)
        .collect();
    twiddled.sort_by(|a, b| a.start_timestamp.total_cmp(&b.start_timestamp));
    twiddled
}

fn clip(mut prediction: Prediction) -> Prediction {
    let duration = prediction.duration_seconds();
    if duration > MAX_PASS_LENGTH_SECONDS {
        let centre = prediction.start_timestamp + duration / 2.0;
        prediction.start_timestamp = centre - MAX_PASS_LENGTH_SECONDS / 2.0;
        prediction.end_timestamp = centre + MAX_PASS_LENGTH_SECONDS / 2.0;
    }
    prediction
}

pub fn next_pass(predictions: Vec<Prediction>) -> Option<Prediction> {
    twiddle(predictions).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AzElLimits, Channel, Satellite};
    use crate::predict::testing::window;
    use crate::predict::CompatibleMode;

    fn prediction(satellite_id: &str, start: f64, end: f64, disabled: bool) -> Prediction {
        let channel = Channel {
            frequency_hz: 145.8e6,
            downlink: true,
            mode: None,
        };
        Prediction::new(
            Satellite {
                id: satellite_id.to_string(),
                name: None,
                tle: Some("tle".to_string()),
                channels: vec![channel.clone()],
                disable_tracking: disabled,
            },
            CompatibleMode {
                channel,
                limits: AzElLimits::default(),
            },
            window(start, end),
        )
    }

    #[test]
    fn long_pass_keeps_centre_and_cap() {
        let clipped = twiddle(vec![prediction("a", 1000.0, 1000.0 + 731.0, false)]);
        let p = &clipped[0];
        assert_eq!(p.duration_seconds(), MAX_PASS_LENGTH_SECONDS);
        assert_eq!(
            (p.start_timestamp + p.end_timestamp) / 2.0,
            1000.0 + 731.0 / 2.0
        );
    }

    #[test]
    fn short_pass_is_untouched() {
        let p = &twiddle(vec![prediction("a", 10.0, 250.0, false)])[0];
        assert_eq!((p.start_timestamp, p.end_timestamp), (10.0, 250.0));
    }

    #[test]
    fn clipping_can_reorder() {
        let passes = vec![
            prediction("long", 0.0, 1000.0, false),
            prediction("short", 100.0, 200.0, false),
        ];
        let ids: Vec<_> = twiddle(passes)
            .into_iter()
            .map(|p| p.satellite.id)
            .collect();
        assert_eq!(ids, vec!["short", "long"]);
    }

    #[test]
    fn disabled_satellite_is_skipped_even_when_earliest() {
        let passes = vec![
            prediction("retired", 10.0, 100.0, true),
            prediction("active", 500.0, 600.0, false),
        ];
        let next = next_pass(passes).unwrap();
        assert_eq!(next.satellite.id, "active");
        assert!(next_pass(vec![prediction("retired", 1.0, 2.0, true)]).is_none());
    }
}
