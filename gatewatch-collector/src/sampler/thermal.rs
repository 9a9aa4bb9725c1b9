//! Temperature sensors under sysfs
//!
//! Two layouts are scanned:
//! - `class/thermal/thermal_zone*/temp`
//! - `class/hwmon/hwmon*/temp*_input`

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::TemperatureSample;

/// Raw readings above this are millidegrees
const MILLIDEGREE_THRESHOLD: f64 = 1000.0;

/// Every readable, positive sensor under `<sys_root>/class`, sorted by id
pub fn scan_sensors(sys_root: &Path) -> Vec<TemperatureSample> {
    let class_dir = sys_root.join("class");
    let mut samples: Vec<TemperatureSample> = sensor_files(&class_dir)
        .into_iter()
        .filter_map(|path| read_sensor(&class_dir, &path))
        .collect();
    samples.sort_by(|a, b| a.sensor.cmp(&b.sensor));
    samples
}

fn sensor_files(class_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for zone in subdirs(&class_dir.join("thermal"), "thermal_zone") {
        files.push(zone.join("temp"));
    }

    for chip in subdirs(&class_dir.join("hwmon"), "hwmon") {
        let Ok(entries) = fs::read_dir(&chip) else {
            continue;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with("temp") && name.ends_with("_input") {
                files.push(entry.path());
            }
        }
    }

    files
}

/// Directories under `dir` whose name starts with `prefix`
fn subdirs(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix))
        .map(|entry| entry.path())
        .collect()
}

fn read_sensor(class_dir: &Path, path: &Path) -> Option<TemperatureSample> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Skipping sensor {}: {}", path.display(), e);
            return None;
        }
    };
    let raw: f64 = match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            debug!("Skipping sensor {}: unparsable value {:?}", path.display(), raw.trim());
            return None;
        }
    };
    if raw <= 0.0 {
        return None;
    }

    Some(TemperatureSample {
        sensor: sensor_id(class_dir, path),
        celsius: scale_reading(raw),
    })
}

/// Millidegree readings are divided down; small values are already Celsius
pub fn scale_reading(raw: f64) -> f64 {
    if raw > MILLIDEGREE_THRESHOLD {
        raw / 1000.0
    } else {
        raw
    }
}

/// `hwmon/hwmon0/temp1_input` -> `hwmon_hwmon0_temp1`
pub fn sensor_id(class_dir: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(class_dir).unwrap_or(path);
    let flat = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|c| c != "/")
        .collect::<Vec<_>>()
        .join("_");
    flat.strip_suffix("_input").unwrap_or(&flat).to_string()
}
