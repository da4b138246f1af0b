use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::clock::unix_seconds;
use crate::predict::bands::VisibilityLimits;
use crate::predict::engine::GeometryEngine;
use crate::predict::error::PredictError;
use crate::predict::ground_station::GroundStation;
use crate::predict::tle::split_tle;
use crate::predict::types::{PassWindow, SatPoint};

/// Delegates geometry to external commands speaking a line protocol on
/// stdin/stdout.
pub struct ProcessEngine {
    predict_command: String,
    pass_details_command: String,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new(predict_command: String, pass_details_command: String, timeout: Duration) -> Self {
        Self {
            predict_command,
            pass_details_command,
            timeout,
        }
    }

    /// The child is killed when it outlives `timeout`.
    async fn run(&self, cmd: &str, input: String) -> Result<String, PredictError> {
        match tokio::time::timeout(self.timeout, self.execute(cmd, input)).await {
            Ok(result) => result,
            Err(_) => Err(PredictError::EngineExit(format!(
                "{:?} did not finish within {}",
                cmd,
                humantime::format_duration(self.timeout)
            ))),
        }
    }

    async fn execute(&self, cmd: &str, input: String) -> Result<String, PredictError> {
        log::debug!("Running geometry command: {}", cmd);

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The command may exit without reading everything.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PredictError::EngineExit(format!(
                "{}: {}",
                output.status,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|e| PredictError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GeometryEngine for ProcessEngine {
    async fn predict(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        limits: &VisibilityLimits,
        tle: &str,
    ) -> Result<Vec<PassWindow>, PredictError> {
        let input = format!(
            "{:.6}\n{:.6}\n{:.6}\n{:.6}\n{:.6}\n{:.6}\n{:.6}\n{:.6}\n{}\n",
            unix_seconds(begin),
            duration.as_secs_f64(),
            station.latitude_deg,
            station.longitude_deg,
            station.altitude_m,
            limits.min_elevation,
            limits.min_azimuth,
            limits.max_azimuth,
            three_line_tle(tle)?,
        );
        let output = self.run(&self.predict_command, input).await?;
        parse_pass_windows(&output)
    }

    async fn pass_details(
        &self,
        begin: DateTime<Utc>,
        duration: Duration,
        station: &GroundStation,
        tle: &str,
        resolution_seconds: f64,
    ) -> Result<Vec<SatPoint>, PredictError> {
        let input = format!(
            "{:.6}\n{:.6}\n{:.6}\n{:.6}\n{:.6}\n{}\n{:.6}\n",
            unix_seconds(begin),
            duration.as_secs_f64(),
            station.latitude_deg,
            station.longitude_deg,
            station.altitude_m,
            three_line_tle(tle)?,
            resolution_seconds,
        );
        let output = self.run(&self.pass_details_command, input).await?;
        parse_sat_points(&output)
    }
}

/// External engines always read three lines; unnamed sets get a placeholder.
fn three_line_tle(tle: &str) -> Result<String, PredictError> {
    let (name, line1, line2) = split_tle(tle)?;
    Ok(format!(
        "{}\n{}\n{}",
        name.unwrap_or_else(|| "SATELLITE".to_string()),
        line1,
        line2
    ))
}

/// Count line followed by that many records.
fn records(output: &str) -> Result<Vec<Vec<&str>>, PredictError> {
    let mut lines = output.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| PredictError::Malformed("missing record count".to_string()))?;
    let count: usize = header
        .trim()
        .parse()
        .map_err(|_| PredictError::Malformed(format!("bad record count {:?}", header)))?;

    let records: Vec<Vec<&str>> = lines
        .take(count)
        .map(|l| l.split_whitespace().collect())
        .collect();
    if records.len() != count {
        return Err(PredictError::Malformed(format!(
            "expected {} records, got {}",
            count,
            records.len()
        )));
    }
    Ok(records)
}

fn field<T: std::str::FromStr>(fields: &[&str], index: usize) -> Result<T, PredictError> {
    let raw = fields
        .get(index)
        .ok_or_else(|| PredictError::Malformed(format!("missing field {}", index)))?;
    raw.parse()
        .map_err(|_| PredictError::Malformed(format!("bad field {}: {:?}", index, raw)))
}

fn flag(fields: &[&str], index: usize) -> Result<bool, PredictError> {
    match fields.get(index).copied() {
        Some("1") | Some("true") | Some("True") => Ok(true),
        Some("0") | Some("false") | Some("False") => Ok(false),
        other => Err(PredictError::Malformed(format!(
            "bad flag {}: {:?}",
            index, other
        ))),
    }
}

pub fn parse_pass_windows(output: &str) -> Result<Vec<PassWindow>, PredictError> {
    records(output)?
        .iter()
        .map(|f| {
            Ok(PassWindow {
                start_timestamp: field(f, 0)?,
                end_timestamp: field(f, 1)?,
                start_azimuth_degrees: field(f, 2)?,
                end_azimuth_degrees: field(f, 3)?,
                max_elevation_degrees: field(f, 4)?,
            })
        })
        .collect()
}

pub fn parse_sat_points(output: &str) -> Result<Vec<SatPoint>, PredictError> {
    records(output)?
        .iter()
        .map(|f| {
            Ok(SatPoint {
                timestamp: field(f, 0)?,
                azimuth_degrees: field(f, 1)?,
                elevation_degrees: field(f, 2)?,
                range_m: field(f, 3)?,
                range_rate_m_s: field(f, 4)?,
                latitude_degrees: field(f, 5)?,
                longitude_degrees: field(f, 6)?,
                height_m: field(f, 7)?,
                is_eclipsed: flag(f, 8)?,
            })
        })
        .collect()
}
