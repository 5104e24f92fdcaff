//! NMEA-0183 GPS receiver on a serial port
//!
//! Sentences used:
//! - `$--GGA` time, lat, N/S, lon, E/W, fix quality, satellites, HDOP, ...
//! - `$--RMC` time, status (A/V), lat, N/S, lon, E/W, ...
//!
//! Checksum (`*HH`, XOR of the bytes between `$` and `*`) is verified when
//! present. Accuracy is estimated as HDOP x UERE; RMC carries no HDOP and
//! reports the configured fallback accuracy.

use super::PositionProvider;
use crate::domain::types::{LocationError, LocationResult, PositionSample};
use crate::infra::config::Config;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, trace};

/// Typical user equivalent range error of a consumer receiver (meters)
const UERE_M: f64 = 5.0;

/// Longest valid NMEA sentence is 82 characters; allow some slack for noise
const MAX_SENTENCE_LEN: usize = 128;

/// Log port open failure (cold path)
#[cold]
fn log_open_failed(device: &str, e: &tokio_serial::Error) {
    error!(device = %device, error = %e, "nmea_port_open_failed");
}

/// Parsing switches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmeaOptions {
    /// Only accept GGA fixes with a reported fix quality
    pub high_accuracy: bool,
    pub fallback_accuracy_m: f64,
}

/// XOR of all bytes between `$` and `*`
fn checksum(body: &str) -> u8 {
    body.bytes().fold(0u8, |acc, b| acc ^ b)
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere to signed degrees
fn parse_coordinate(value: &str, hemisphere: &str) -> Result<Option<f64>, LocationError> {
    if value.is_empty() || hemisphere.is_empty() {
        return Ok(None);
    }
    let raw: f64 =
        value.parse().map_err(|_| LocationError::Parse(format!("bad coordinate {value:?}")))?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if !(0.0..60.0).contains(&minutes) {
        return Err(LocationError::Parse(format!("bad minutes in {value:?}")));
    }
    let unsigned = degrees + minutes / 60.0;
    match hemisphere {
        "N" | "E" => Ok(Some(unsigned)),
        "S" | "W" => Ok(Some(-unsigned)),
        other => Err(LocationError::Parse(format!("bad hemisphere {other:?}"))),
    }
}

fn lat_lon(fields: &[&str], at: usize) -> Result<Option<(f64, f64)>, LocationError> {
    let get = |i: usize| fields.get(i).copied().unwrap_or("");
    let lat = parse_coordinate(get(at), get(at + 1))?;
    let lon = parse_coordinate(get(at + 2), get(at + 3))?;
    match (lat, lon) {
        (Some(lat), Some(lon)) if lat.abs() <= 90.0 && lon.abs() <= 180.0 => Ok(Some((lat, lon))),
        (Some(_), Some(_)) => Err(LocationError::Parse("coordinate out of range".to_string())),
        _ => Ok(None),
    }
}

/// Parse one sentence.
///
/// `Ok(None)` for sentences that carry no usable fix (other types, no fix
/// yet, RMC in high-accuracy mode).
pub fn parse_sentence(
    line: &str,
    options: NmeaOptions,
) -> Result<Option<PositionSample>, LocationError> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('$') else {
        return Ok(None);
    };

    let body = match rest.split_once('*') {
        Some((body, sum)) => {
            let expected = u8::from_str_radix(sum.trim(), 16)
                .map_err(|_| LocationError::Parse(format!("bad checksum field {sum:?}")))?;
            let actual = checksum(body);
            if actual != expected {
                return Err(LocationError::Parse(format!(
                    "checksum mismatch: expected {expected:02X}, got {actual:02X}"
                )));
            }
            body
        }
        None => rest,
    };

    let fields: Vec<&str> = body.split(',').collect();
    let address = fields[0];
    if address.len() < 5 {
        return Ok(None);
    }
    // Skip the two-character talker id (GP, GN, GL, ...)
    let Some(sentence) = address.get(address.len() - 3..) else {
        return Ok(None);
    };

    match sentence {
        "GGA" => {
            let quality: u8 = fields.get(6).and_then(|q| q.parse().ok()).unwrap_or(0);
            if quality == 0 {
                return Ok(None);
            }
            let Some((latitude, longitude)) = lat_lon(&fields, 2)? else {
                return Ok(None);
            };
            let accuracy = fields
                .get(8)
                .and_then(|h| h.parse::<f64>().ok())
                .filter(|h| h.is_finite() && *h > 0.0)
                .map(|hdop| hdop * UERE_M)
                .unwrap_or(options.fallback_accuracy_m);
            Ok(Some(PositionSample::new(latitude, longitude, accuracy)))
        }
        "RMC" => {
            if options.high_accuracy || fields.get(2).copied() != Some("A") {
                return Ok(None);
            }
            let Some((latitude, longitude)) = lat_lon(&fields, 3)? else {
                return Ok(None);
            };
            Ok(Some(PositionSample::new(latitude, longitude, options.fallback_accuracy_m)))
        }
        _ => Ok(None),
    }
}

/// Serial GPS provider. The port is opened lazily on the first poll.
pub struct NmeaProvider {
    device: String,
    baud: u32,
    options: NmeaOptions,
    lines: Option<Lines<BufReader<SerialStream>>>,
    failed: bool,
}

impl NmeaProvider {
    pub fn new(device: &str, baud: u32, options: NmeaOptions) -> Self {
        Self { device: device.to_string(), baud, options, lines: None, failed: false }
    }

    pub fn from_config(config: &Config, high_accuracy: bool) -> Self {
        Self::new(
            config.serial_device(),
            config.serial_baud(),
            NmeaOptions { high_accuracy, fallback_accuracy_m: config.fallback_accuracy_m() },
        )
    }

    fn open(&mut self) -> Result<(), LocationError> {
        let port = tokio_serial::new(&self.device, self.baud)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| {
                log_open_failed(&self.device, &e);
                match e.kind() {
                    tokio_serial::ErrorKind::Io(ErrorKind::PermissionDenied) => {
                        LocationError::PermissionDenied
                    }
                    _ => LocationError::Unavailable(format!("{}: {}", self.device, e)),
                }
            })?;
        info!(device = %self.device, baud = %self.baud, "nmea_port_opened");
        self.lines = Some(BufReader::new(port).lines());
        Ok(())
    }
}

#[async_trait]
impl PositionProvider for NmeaProvider {
    fn name(&self) -> &'static str {
        "nmea"
    }

    async fn next_fix(&mut self) -> Option<LocationResult> {
        if self.failed {
            return None;
        }
        if self.lines.is_none() {
            if let Err(e) = self.open() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        let lines = self.lines.as_mut()?;

        loop {
            // next_line is cancel-safe, so a watch timeout loses no partial line
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.len() > MAX_SENTENCE_LEN {
                        debug!(len = line.len(), "nmea_line_too_long");
                        continue;
                    }
                    trace!(line = %line.trim(), "nmea_sentence");
                    match parse_sentence(&line, self.options) {
                        Ok(Some(sample)) => return Some(Ok(sample)),
                        Ok(None) => continue,
                        Err(e) => {
                            // Line noise is common on serial links; skip the sentence
                            debug!(error = %e, "nmea_sentence_rejected");
                            continue;
                        }
                    }
                }
                Ok(None) => {
                    self.failed = true;
                    return Some(Err(LocationError::Unavailable(format!(
                        "{}: stream closed",
                        self.device
                    ))));
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => continue,
                // Non-UTF-8 garbage between sentences
                Err(e) if e.kind() == ErrorKind::InvalidData => continue,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(LocationError::Unavailable(format!("{}: {}", self.device, e))));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTS: NmeaOptions = NmeaOptions { high_accuracy: true, fallback_accuracy_m: 25.0 };
    const LOOSE: NmeaOptions = NmeaOptions { high_accuracy: false, fallback_accuracy_m: 25.0 };

    #[test]
    fn test_parse_gga() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        let sample = parse_sentence(line, OPTS).unwrap().unwrap();
        assert!((sample.latitude - 48.1173).abs() < 1e-9);
        assert!((sample.longitude - 11.516_666_666).abs() < 1e-6);
        assert!((sample.accuracy - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_parse_gga_workshop_position() {
        let line = "$GNGGA,081502.00,3645.1500,N,00302.5200,E,2,10,1.2,20.0,M,40.0,M,,*4D";
        let sample = parse_sentence(line, OPTS).unwrap().unwrap();
        assert!((sample.latitude - 36.7525).abs() < 1e-9);
        assert!((sample.longitude - 3.042).abs() < 1e-9);
        assert!((sample.accuracy - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_southern_western_hemisphere() {
        let line = "$GPGGA,081502.00,3645.1500,S,00302.5200,W,1,10,1.2,20.0,M,40.0,M,,*5F";
        let sample = parse_sentence(line, OPTS).unwrap().unwrap();
        assert!((sample.latitude + 36.7525).abs() < 1e-9);
        assert!((sample.longitude + 3.042).abs() < 1e-9);
    }

    #[test]
    fn test_gga_without_fix_is_ignored() {
        let line = "$GPGGA,081502.00,,,,,0,00,99.99,,,,,,*68";
        assert_eq!(parse_sentence(line, OPTS).unwrap(), None);
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*48";
        assert!(matches!(parse_sentence(line, OPTS), Err(LocationError::Parse(_))));
    }

    #[test]
    fn test_sentence_without_checksum_accepted() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(parse_sentence(line, OPTS).unwrap().is_some());
    }

    #[test]
    fn test_rmc_only_in_low_accuracy_mode() {
        let line = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
        assert_eq!(parse_sentence(line, OPTS).unwrap(), None);

        let sample = parse_sentence(line, LOOSE).unwrap().unwrap();
        assert!((sample.latitude - 48.1173).abs() < 1e-9);
        assert_eq!(sample.accuracy, 25.0);
    }

    #[test]
    fn test_rmc_void_is_ignored() {
        let line = "$GPRMC,081502.00,V,,,,,,,050324,,,N*73";
        assert_eq!(parse_sentence(line, LOOSE).unwrap(), None);
    }

    #[test]
    fn test_other_sentences_and_noise_ignored() {
        assert_eq!(parse_sentence("$GPGSV,3,1,11,03,03,111,00*4A", OPTS).unwrap(), None);
        assert_eq!(parse_sentence("garbage", OPTS).unwrap(), None);
        assert_eq!(parse_sentence("$GP", OPTS).unwrap(), None);
    }

    #[test]
    fn test_bad_hemisphere_rejected() {
        let line = "$GPGGA,123519,4807.038,X,01131.000,E,1,08,0.9,545.4,M,46.9,M,,";
        assert!(matches!(parse_sentence(line, OPTS), Err(LocationError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_device_is_unavailable_once() {
        let mut provider = NmeaProvider::new("/dev/does-not-exist-gps", 9600, OPTS);
        let first = provider.next_fix().await;
        assert!(matches!(
            first,
            Some(Err(LocationError::Unavailable(_))) | Some(Err(LocationError::PermissionDenied))
        ));
        assert_eq!(provider.next_fix().await, None);
    }
}
