//! Compass calibration progress and result.
//!
//! Progress from up to three compasses is folded into one aggregate percentage on
//! `<ns>/status`; the final verdict goes to `<ns>/report`. Both topics are latched.

use crate::messages::{MagCalProgress, MagCalReport, MagCalStatus};
use crate::plugin::Plugin;
use crate::registry::{make_handler, Subscription};
use crate::topics::LatchedTopic;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

pub const NAME: &str = "mag_calibration_status";

const MAX_SENSORS: usize = 3;
const SENSOR_BITS: u8 = 0b111;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MagnetometerReport {
    /// Raw `MagCalStatus` value
    pub report: u8,
    pub confidence: f32,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CalibrationState {
    pub per_sensor_progress: [u8; MAX_SENSORS],
    /// Last seen `cal_mask`
    pub mask: u8,
}

impl CalibrationState {
    /// Fold one progress report in. Returns the new aggregate, or `None` if the report
    /// was ignored and nothing changed.
    pub fn apply(&mut self, compass_id: u8, cal_mask: u8, completion_pct: u8) -> Option<u8> {
        let calibrating = (cal_mask & SENSOR_BITS).count_ones() as u8;
        if usize::from(compass_id) >= MAX_SENSORS || calibrating == 0 {
            return None;
        }
        self.per_sensor_progress[usize::from(compass_id)] = completion_pct / calibrating;
        self.mask = cal_mask;
        Some(self.aggregate())
    }

    pub fn aggregate(&self) -> u8 {
        self.per_sensor_progress
            .iter()
            .fold(0u8, |acc, p| acc.wrapping_add(*p))
    }
}

pub struct MagCalStatusPlugin {
    state: Mutex<CalibrationState>,
    status: LatchedTopic<u8>,
    report: LatchedTopic<MagnetometerReport>,
}

impl MagCalStatusPlugin {
    pub fn new(namespace: &str) -> Self {
        let ns = namespace.trim_end_matches('/');
        Self {
            state: Mutex::new(CalibrationState::default()),
            status: LatchedTopic::new(format!("{ns}/status")),
            report: LatchedTopic::new(format!("{ns}/report")),
        }
    }

    pub fn status_topic(&self) -> &LatchedTopic<u8> {
        &self.status
    }

    pub fn report_topic(&self) -> &LatchedTopic<MagnetometerReport> {
        &self.report
    }

    pub fn state(&self) -> CalibrationState {
        *self.state.lock()
    }

    pub fn handle_progress(&self, mp: &MagCalProgress) {
        debug!(
            compass_id = mp.compass_id,
            cal_mask = mp.cal_mask,
            completion_pct = mp.completion_pct,
            attempt = mp.attempt,
            "mag cal progress"
        );
        let aggregate = self
            .state
            .lock()
            .apply(mp.compass_id, mp.cal_mask, mp.completion_pct);
        match aggregate {
            Some(total) => self.status.publish(total),
            None => debug!(compass_id = mp.compass_id, "progress ignored"),
        }
    }

    pub fn handle_report(&self, mr: &MagCalReport) {
        let status = MagCalStatus::try_from(mr.cal_status);
        info!(
            compass_id = mr.compass_id,
            status = ?status,
            fitness = mr.fitness,
            confidence = mr.orientation_confidence,
            "mag cal report"
        );
        self.report.publish(MagnetometerReport {
            report: mr.cal_status,
            confidence: mr.orientation_confidence,
        });
    }
}

impl Plugin for MagCalStatusPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn subscriptions(self: Arc<Self>) -> Vec<Subscription> {
        let on_progress = Arc::clone(&self);
        let on_report = self;
        vec![
            make_handler::<MagCalProgress, _>("mag_cal_progress", move |_, mp| {
                on_progress.handle_progress(&mp);
                Ok(())
            }),
            make_handler::<MagCalReport, _>("mag_cal_report", move |_, mr| {
                on_report.handle_report(&mr);
                Ok(())
            }),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::encode_message;
    use crate::registry::HandlerRegistry;
    use mav_link::{Framing, ReceivedFrame};

    fn progress(compass_id: u8, cal_mask: u8, completion_pct: u8) -> ReceivedFrame {
        ReceivedFrame::new(
            encode_message(&MagCalProgress {
                compass_id,
                cal_mask,
                completion_pct,
                ..Default::default()
            }),
            Framing::Ok,
        )
    }

    fn loaded() -> (Arc<MagCalStatusPlugin>, HandlerRegistry) {
        let plugin = Arc::new(MagCalStatusPlugin::new("~mag_calibration"));
        let mut registry = HandlerRegistry::new();
        registry.subscribe_all(Arc::clone(&plugin).subscriptions());
        (plugin, registry)
    }

    #[test]
    fn test_two_compass_progress_aggregates() {
        let (plugin, registry) = loaded();

        registry.dispatch(&progress(0, 0b011, 50));
        assert_eq!(plugin.state().per_sensor_progress, [25, 0, 0]);
        assert_eq!(plugin.status_topic().latest(), Some(25));

        registry.dispatch(&progress(1, 0b011, 100));
        assert_eq!(plugin.state().per_sensor_progress, [25, 50, 0]);
        assert_eq!(plugin.status_topic().latest(), Some(75));
        assert_eq!(plugin.state().mask, 0b011);
    }

    #[test]
    fn test_out_of_range_compass_is_ignored() {
        let (plugin, registry) = loaded();
        registry.dispatch(&progress(0, 0b001, 40));
        let before = plugin.state();

        let rx = plugin.status_topic().subscribe();
        registry.dispatch(&progress(5, 0b011, 90));

        assert_eq!(plugin.state(), before);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_empty_mask_is_ignored() {
        let (plugin, registry) = loaded();
        registry.dispatch(&progress(1, 0b1000, 90));
        assert_eq!(plugin.state(), CalibrationState::default());
        assert_eq!(plugin.status_topic().latest(), None);
    }

    #[test]
    fn test_final_report_leaves_progress_alone() {
        let (plugin, registry) = loaded();
        registry.dispatch(&progress(0, 0b011, 50));
        registry.dispatch(&progress(1, 0b011, 100));

        let report = MagCalReport {
            compass_id: 0,
            cal_mask: 0b011,
            cal_status: MagCalStatus::Success as u8,
            orientation_confidence: 0.87,
            ..Default::default()
        };
        registry.dispatch(&ReceivedFrame::new(encode_message(&report), Framing::Ok));

        assert_eq!(
            plugin.report_topic().latest(),
            Some(MagnetometerReport {
                report: 4,
                confidence: 0.87
            })
        );
        assert_eq!(plugin.state().per_sensor_progress, [25, 50, 0]);
        assert_eq!(plugin.status_topic().latest(), Some(75));
    }

    #[test]
    fn test_every_report_is_published() {
        let plugin = MagCalStatusPlugin::new("cal/");
        assert_eq!(plugin.report_topic().name(), "cal/report");
        for status in [MagCalStatus::Failed, MagCalStatus::Success] {
            plugin.handle_report(&MagCalReport {
                cal_status: status as u8,
                ..Default::default()
            });
        }
        assert_eq!(plugin.report_topic().latest().map(|r| r.report), Some(4));
    }

    #[test]
    fn test_report_serializes_with_field_names() {
        let json = serde_json::to_string(&MagnetometerReport {
            report: 5,
            confidence: 0.5,
        })
        .unwrap();
        assert_eq!(json, r#"{"report":5,"confidence":0.5}"#);
    }

    #[test]
    fn test_aggregate_wraps_instead_of_saturating() {
        let mut state = CalibrationState::default();
        state.apply(0, 0b001, 200);
        assert_eq!(state.apply(1, 0b001, 100), Some(44));
    }
}
