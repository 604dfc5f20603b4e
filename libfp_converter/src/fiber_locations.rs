// The lab keeps one fiber location table per mouse, exported from the histology
// spreadsheet as a CSV with a single header row:
// roi,fiber_bottom_AP,fiber_bottom_ML,fiber_bottom_DV,fiber_bottom_AP_idx,fiber_bottom_ML_idx,fiber_bottom_DV_idx,ccf_label
// The ROI column is the 0-based ROI index of the fluorescence file. An empty ccf_label
// marks a fiber that could not be located after histology; those are kept in the table
// but flagged as bad fibers.
use bit_set::BitSet;
use fxhash::FxHashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::error::FiberLocationError;

const ENTRIES_PER_LINE: usize = 8;

/// Static location of one implanted fiber
#[derive(Debug, Clone, PartialEq)]
pub struct FiberLocation {
    pub roi: usize,
    /// Fiber bottom (AP, ML, DV) in mm from bregma
    pub coordinates: [f64; 3],
    /// Fiber bottom (AP, ML, DV) as Allen Brain Atlas voxel indices
    pub allen_atlas_coordinates: [f64; 3],
    /// CCF brain area, None when the fiber was not found
    pub brain_area: Option<String>,
}

impl FiberLocation {
    pub fn is_good_fiber(&self) -> bool {
        self.brain_area.is_some()
    }
}

/// All fiber locations of one mouse, keyed by ROI index
#[derive(Debug, Clone, Default)]
pub struct FiberLocationTable {
    map: FxHashMap<usize, FiberLocation>,
}

fn parse_triplet(entries: &[&str]) -> Result<[f64; 3], FiberLocationError> {
    Ok([
        entries[0].trim().parse()?,
        entries[1].trim().parse()?,
        entries[2].trim().parse()?,
    ])
}

impl FiberLocationTable {
    /// Read the table from a CSV file
    pub fn read(path: &Path) -> Result<Self, FiberLocationError> {
        if !path.exists() {
            return Err(FiberLocationError::BadFilePath(path.to_path_buf()));
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, FiberLocationError> {
        let mut table = FiberLocationTable::default();

        let mut lines = contents.lines();
        lines.next(); // Skip the header
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            // Plain split so that an empty trailing label still counts as a column
            let entries: Vec<&str> = line.split(',').collect();
            if entries.len() != ENTRIES_PER_LINE {
                return Err(FiberLocationError::BadFileFormat);
            }

            let roi: usize = entries[0].trim().parse()?;
            let label = entries[7].trim();
            let location = FiberLocation {
                roi,
                coordinates: parse_triplet(&entries[1..4])?,
                allen_atlas_coordinates: parse_triplet(&entries[4..7])?,
                brain_area: if label.is_empty() {
                    None
                } else {
                    Some(label.to_string())
                },
            };
            if table.map.insert(roi, location).is_some() {
                return Err(FiberLocationError::DuplicateRoi(roi));
            }
        }

        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get the location of the fiber recorded as the given ROI.
    ///
    /// If returns None the ROI has no fiber in the table
    pub fn get(&self, roi: usize) -> Option<&FiberLocation> {
        self.map.get(&roi)
    }

    /// All fibers ordered by ROI
    pub fn locations(&self) -> Vec<&FiberLocation> {
        let mut locations: Vec<&FiberLocation> = self.map.values().collect();
        locations.sort_by_key(|loc| loc.roi);
        locations
    }

    /// The ROIs whose fibers were located in the brain
    pub fn good_fibers(&self) -> BitSet {
        self.map
            .values()
            .filter(|loc| loc.is_good_fiber())
            .map(|loc| loc.roi)
            .collect()
    }
}

//Unit tests
#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "roi,fiber_bottom_AP,fiber_bottom_ML,fiber_bottom_DV,fiber_bottom_AP_idx,fiber_bottom_ML_idx,fiber_bottom_DV_idx,ccf_label
0,0.5,1.25,-3.1,520,310,402,Caudoputamen
1,0.7,1.50,-3.4,512,320,410,
2,1.1,1.75,-4.0,498,331,431,Nucleus accumbens
";

    #[test]
    fn test_parse_table() {
        let table = FiberLocationTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        let fiber = table.get(0).unwrap();
        assert_eq!(fiber.coordinates, [0.5, 1.25, -3.1]);
        assert_eq!(fiber.allen_atlas_coordinates, [520.0, 310.0, 402.0]);
        assert_eq!(fiber.brain_area.as_deref(), Some("Caudoputamen"));
        assert!(!table.get(1).unwrap().is_good_fiber());
        assert!(table.get(3).is_none());
        let rois: Vec<usize> = table.locations().iter().map(|loc| loc.roi).collect();
        assert_eq!(rois, vec![0, 1, 2]);

        let good = table.good_fibers();
        assert!(good.contains(0) && good.contains(2) && !good.contains(1));
    }

    #[test]
    fn test_bad_format() {
        let bad = "header\n0,1.0,2.0\n";
        assert!(matches!(
            FiberLocationTable::parse(bad).unwrap_err(),
            FiberLocationError::BadFileFormat
        ));
        let dup = "header\n0,1,1,1,1,1,1,CP\n0,1,1,1,1,1,1,CP\n";
        assert!(matches!(
            FiberLocationTable::parse(dup).unwrap_err(),
            FiberLocationError::DuplicateRoi(0)
        ));
    }
}
