use serde::{Deserialize, Serialize};
use std::path::Path;

use super::demux::Wavelength;
use super::error::InstrumentError;

/// Indicator names that can appear inside an AAV construct string
const KNOWN_INDICATORS: [&str; 6] = [
    "dLight1.3b",
    "GCaMP7f",
    "Ach3.0",
    "jRGECO1a",
    "tdTomato",
    "rDA3m",
];

/// Load the default template for windows
#[cfg(target_family = "windows")]
fn load_default_template() -> &'static str {
    include_str!("data\\default_instrument.yml")
}

/// Load the default template for macos and linux
#[cfg(target_family = "unix")]
fn load_default_template() -> &'static str {
    include_str!("data/default_instrument.yml")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcitationSource {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub illumination_type: String,
    pub excitation_wavelength_in_nm: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpticalFilter {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub center_wavelength_in_nm: f64,
    pub bandwidth_in_nm: f64,
    pub filter_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub name: String,
    pub description: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DichroicRule {
    pub wavelength_nm: u32,
    pub dichroic_mirror: String,
}

/// Declarative description of the photometry rig.
///
/// Serializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentTemplate {
    pub excitation_sources: Vec<ExcitationSource>,
    pub optical_filters: Vec<OpticalFilter>,
    pub dichroic_mirrors: Vec<Device>,
    pub dichroic_for_wavelength: Vec<DichroicRule>,
    pub indicators: Vec<Indicator>,
    pub photodetectors: Vec<Device>,
    pub optical_fibers: Vec<Device>,
}

/// The devices in the light path of one excitation wavelength
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDevices {
    pub wavelength: Wavelength,
    pub excitation_source: ExcitationSource,
    pub excitation_filter: OpticalFilter,
    pub dichroic_mirror: Device,
    pub indicator: Indicator,
    pub photodetector: Device,
    pub optical_fiber: Device,
}

fn find_device<'a, T>(
    items: &'a [T],
    kind: &'static str,
    name: &str,
    name_of: impl Fn(&T) -> &str,
) -> Result<&'a T, InstrumentError> {
    items
        .iter()
        .find(|item| name_of(item) == name)
        .ok_or_else(|| InstrumentError::MissingDevice(kind, name.to_string()))
}

fn first_device<'a>(items: &'a [Device], kind: &'static str) -> Result<&'a Device, InstrumentError> {
    items
        .first()
        .ok_or_else(|| InstrumentError::MissingDevice(kind, String::from("<any>")))
}

impl InstrumentTemplate {
    /// Read a template from a YAML file. If the path is None, the bundled default is used
    pub fn load(path: Option<&Path>) -> Result<Self, InstrumentError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(InstrumentError::BadFilePath(p.to_path_buf()));
                }
                let yaml_str = std::fs::read_to_string(p)?;
                Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
            }
            None => Ok(serde_yaml::from_str::<Self>(load_default_template())?),
        }
    }

    pub fn dichroic_mirror_name(&self, wavelength: Wavelength) -> Result<&str, InstrumentError> {
        self.dichroic_for_wavelength
            .iter()
            .find(|rule| rule.wavelength_nm == wavelength.0)
            .map(|rule| rule.dichroic_mirror.as_str())
            .ok_or(InstrumentError::UnknownWavelength(wavelength.0))
    }

    pub fn excitation_source(
        &self,
        wavelength: Wavelength,
    ) -> Result<&ExcitationSource, InstrumentError> {
        find_device(
            &self.excitation_sources,
            "excitation source",
            &format!("ExcitationSource{wavelength}"),
            |d| d.name.as_str(),
        )
    }

    /// Resolve every device of the light path for a wavelength and indicator
    pub fn resolve(
        &self,
        wavelength: Wavelength,
        indicator: &str,
    ) -> Result<ChannelDevices, InstrumentError> {
        let dichroic_name = self.dichroic_mirror_name(wavelength)?;
        Ok(ChannelDevices {
            wavelength,
            excitation_source: self.excitation_source(wavelength)?.clone(),
            excitation_filter: find_device(
                &self.optical_filters,
                "optical filter",
                &format!("OpticalFilter{wavelength}"),
                |d| d.name.as_str(),
            )?
            .clone(),
            dichroic_mirror: find_device(
                &self.dichroic_mirrors,
                "dichroic mirror",
                dichroic_name,
                |d| d.name.as_str(),
            )?
            .clone(),
            indicator: find_device(&self.indicators, "indicator", indicator, |d| {
                d.name.as_str()
            })?
            .clone(),
            photodetector: first_device(&self.photodetectors, "photodetector")?.clone(),
            optical_fiber: first_device(&self.optical_fibers, "optical fiber")?.clone(),
        })
    }
}

/// Find the indicator named in an injected construct, e.g.
/// `pAAV-CAG-dLight1.3b (AAV5)` -> `dLight1.3b`
pub fn indicator_from_construct(construct: &str) -> Result<&'static str, InstrumentError> {
    KNOWN_INDICATORS
        .iter()
        .filter_map(|name| construct.find(name).map(|pos| (pos, *name)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, name)| name)
        .ok_or_else(|| InstrumentError::UnknownIndicator(construct.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let template = InstrumentTemplate::load(None).unwrap();
        let devices = template.resolve(Wavelength(470), "dLight1.3b").unwrap();
        assert_eq!(devices.excitation_source.name, "ExcitationSource470");
        assert_eq!(devices.excitation_filter.name, "OpticalFilter470");
        assert_eq!(devices.dichroic_mirror.name, "DichroicMirror2");
        let red = template.resolve(Wavelength(570), "jRGECO1a").unwrap();
        assert_eq!(red.dichroic_mirror.name, "DichroicMirror3a");
    }

    #[test]
    fn test_unknown_wavelength() {
        let template = InstrumentTemplate::load(None).unwrap();
        assert!(matches!(
            template.resolve(Wavelength(530), "GCaMP7f").unwrap_err(),
            InstrumentError::UnknownWavelength(530)
        ));
        assert!(matches!(
            template.resolve(Wavelength(470), "GCaMP6s").unwrap_err(),
            InstrumentError::MissingDevice("indicator", _)
        ));
    }

    #[test]
    fn test_indicator_from_construct() {
        assert_eq!(
            indicator_from_construct("pAAV-CAG-dLight1.3b (AAV5)").unwrap(),
            "dLight1.3b"
        );
        assert_eq!(
            indicator_from_construct("AAV9-hSyn-ACh3.0 / Ach3.0").unwrap(),
            "Ach3.0"
        );
        assert!(indicator_from_construct("AAV-hSyn-EGFP").is_err());
    }

    #[test]
    fn test_missing_template_file() {
        assert!(InstrumentTemplate::load(Some(Path::new("/nope/rig.yml"))).is_err());
    }
}
