//! Calibrated mapping from a hotspot column to an encoder setpoint.

use interpn::one_dim::{Interp1D, RectilinearGrid1D};
use serde::{Deserialize, Serialize};

/// How to pick a setpoint for a column inside the table's domain
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterpMethod {
    /// Setpoint of the closest calibrated column.
    /// Equidistant columns resolve to the earlier (smaller) entry.
    #[default]
    Nearest,

    /// Linear interpolation between the neighbouring calibrated columns,
    /// rounded to the nearest count.
    Linear,
}

/// Empirical pairs of hotspot column and encoder setpoint, sorted by column
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    /// Hotspot columns, strictly increasing
    pub columns: Vec<usize>,

    /// Encoder setpoint for each column
    pub setpoints: Vec<i64>,
}

impl Default for CalibrationTable {
    /// Table measured on the original turret: columns 5 through 20
    fn default() -> Self {
        Self {
            columns: (5..=20).collect(),
            setpoints: vec![
                -25475, -25648, -25822, -25995, -26169, -26343, -26516, -26690, -26864, -27037,
                -27211, -27385, -27558, -27732, -27906, -28079,
            ],
        }
    }
}

impl CalibrationTable {
    pub fn new(columns: Vec<usize>, setpoints: Vec<i64>) -> Result<Self, String> {
        let table = Self { columns, setpoints };
        table.validate()?;
        Ok(table)
    }

    /// Check that the table is non-empty, lengths match and columns ascend
    pub fn validate(&self) -> Result<(), String> {
        if self.columns.is_empty() {
            return Err("Calibration table is empty".to_owned());
        }
        if self.columns.len() != self.setpoints.len() {
            return Err(format!(
                "Calibration table has {} columns but {} setpoints",
                self.columns.len(),
                self.setpoints.len()
            ));
        }
        if !self.columns.windows(2).all(|w| w[0] < w[1]) {
            return Err("Calibration columns must be strictly increasing".to_owned());
        }
        Ok(())
    }

    /// Smallest and largest calibrated column
    pub fn domain(&self) -> Option<(usize, usize)> {
        Some((*self.columns.first()?, *self.columns.last()?))
    }
}

/// Maps hotspot columns to setpoints. Columns outside the calibrated domain are a
/// miss, not a fault.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TargetMapper {
    table: CalibrationTable,
    method: InterpMethod,
}

impl TargetMapper {
    pub fn new(table: CalibrationTable, method: InterpMethod) -> Result<Self, String> {
        table.validate()?;
        Ok(Self { table, method })
    }

    pub fn table(&self) -> &CalibrationTable {
        &self.table
    }

    /// Setpoint for a hotspot column, or `None` outside the calibrated domain
    pub fn map(&self, column: usize) -> Option<i64> {
        let (lo, hi) = self.table.domain()?;
        if column < lo || column > hi {
            return None;
        }

        match self.method {
            InterpMethod::Nearest => self.nearest(column),
            InterpMethod::Linear => self.linear(column).or_else(|| self.nearest(column)),
        }
    }

    fn nearest(&self, column: usize) -> Option<i64> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, &c) in self.table.columns.iter().enumerate() {
            let dist = c.abs_diff(column);
            if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((idx, dist));
            }
        }
        best.map(|(idx, _)| self.table.setpoints[idx])
    }

    fn linear(&self, column: usize) -> Option<i64> {
        let x: Vec<f64> = self.table.columns.iter().map(|&c| c as f64).collect();
        let y: Vec<f64> = self.table.setpoints.iter().map(|&s| s as f64).collect();
        if x.len() < 2 {
            return None;
        }
        let grid = RectilinearGrid1D::new(&x, &y).ok()?;
        let v = interpn::Linear1D::new(grid).eval_one(column as f64).ok()?;
        Some(v.round() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper(columns: Vec<usize>, setpoints: Vec<i64>) -> TargetMapper {
        TargetMapper::new(
            CalibrationTable::new(columns, setpoints).unwrap(),
            InterpMethod::Nearest,
        )
        .unwrap()
    }

    #[test]
    fn outside_domain_is_no_target() {
        let m = TargetMapper::default();
        assert_eq!(m.map(4), None);
        assert_eq!(m.map(21), None);
        assert_eq!(m.map(0), None);
    }

    #[test]
    fn exact_column_returns_its_setpoint() {
        let m = TargetMapper::default();
        assert_eq!(m.map(5), Some(-25475));
        assert_eq!(m.map(12), Some(-26690));
        assert_eq!(m.map(20), Some(-28079));
    }

    #[test]
    fn ties_resolve_to_the_lower_entry() {
        let m = mapper(vec![10, 14, 20], vec![100, 200, 300]);
        assert_eq!(m.map(12), Some(100));
        assert_eq!(m.map(13), Some(200));
        assert_eq!(m.map(17), Some(200));
        assert_eq!(m.map(18), Some(300));
    }

    #[test]
    fn linear_interpolates_between_entries() {
        let m = TargetMapper::new(
            CalibrationTable::new(vec![10, 20], vec![0, 1000]).unwrap(),
            InterpMethod::Linear,
        )
        .unwrap();
        assert_eq!(m.map(15), Some(500));
        assert_eq!(m.map(10), Some(0));
        assert_eq!(m.map(21), None);
    }

    #[test]
    fn rejects_malformed_tables() {
        assert!(CalibrationTable::new(vec![], vec![]).is_err());
        assert!(CalibrationTable::new(vec![1, 2], vec![1]).is_err());
        assert!(CalibrationTable::new(vec![2, 2], vec![1, 1]).is_err());
        assert!(CalibrationTable::default().validate().is_ok());
    }
}
