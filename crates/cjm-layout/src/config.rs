use cjm_core::geom::{Size, size};
use cjm_core::{CjmConfig, Error, Result};

/// Grid constants. All lengths are scene units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub block_size: Size,
    pub marker_size: Size,
    /// Inner margin of a procedure frame.
    pub padding: f64,
    pub gap_x: f64,
    pub gap_y: f64,
    /// Distance between procedure frames, horizontally and vertically.
    pub lane_gap: f64,
    /// Widest grid (in columns) that still gets a trailing end-marker column.
    pub max_columns: usize,
    pub branch_offset_step: f64,
    /// How far cycle connectors bend away from the straight route.
    pub cycle_elbow_offset: f64,
    /// Draw a dashed line between stacked procedure components.
    pub separators: bool,
    /// Half the vertical room a separator claims between two components.
    pub separator_padding: f64,
    /// How far a separator reaches past the outermost frames.
    pub separator_margin_x: f64,
    /// Summary panels left of every component.
    pub scenarios: bool,
    pub scenario: ScenarioConfig,
}

/// Geometry and type sizes of the component summary panels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenarioConfig {
    pub width: f64,
    /// Distance between a panel and the leftmost frame of its component.
    pub gap: f64,
    pub padding: f64,
    pub min_height: f64,
    pub title_font_size: f64,
    pub body_font_size: f64,
    pub cycle_font_size: f64,
    pub procedures_font_size: f64,
    pub procedures_padding: f64,
    /// Space between the summary panel and the procedure list under it.
    pub procedures_gap: f64,
    pub procedures_min_height: f64,
    /// Procedures listed before the rest is summarized as a count.
    pub procedures_limit: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            width: 360.0,
            gap: 120.0,
            padding: 24.0,
            min_height: 180.0,
            title_font_size: 22.0,
            body_font_size: 16.0,
            cycle_font_size: 16.0,
            procedures_font_size: 16.0,
            procedures_padding: 20.0,
            procedures_gap: 16.0,
            procedures_min_height: 140.0,
            procedures_limit: 6,
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            block_size: size(260.0, 120.0),
            marker_size: size(180.0, 90.0),
            padding: 150.0,
            gap_x: 120.0,
            gap_y: 80.0,
            lane_gap: 300.0,
            max_columns: 24,
            branch_offset_step: 15.0,
            cycle_elbow_offset: 80.0,
            separators: true,
            separator_padding: 220.0,
            separator_margin_x: 80.0,
            scenarios: true,
            scenario: ScenarioConfig::default(),
        }
    }
}

impl LayoutConfig {
    /// Reads `layout.*` overrides; missing keys keep their defaults.
    pub fn from_config(config: &CjmConfig) -> Result<Self> {
        let d = Self::default();
        let length = |key: &str, default: f64, allow_zero: bool| -> Result<f64> {
            let Some(raw) = config.get(key) else {
                return Ok(default);
            };
            match raw.as_f64() {
                Some(v) if v.is_finite() && (v > 0.0 || (allow_zero && v == 0.0)) => Ok(v),
                _ => Err(Error::InvalidConfig {
                    key: key.to_string(),
                    message: if allow_zero {
                        "expected a non-negative number".to_string()
                    } else {
                        "expected a positive number".to_string()
                    },
                }),
            }
        };

        let max_columns = match config.get("layout.max_columns") {
            None => d.max_columns,
            Some(raw) => raw
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .filter(|&n| n >= 1)
                .ok_or_else(|| Error::InvalidConfig {
                    key: "layout.max_columns".to_string(),
                    message: "expected an integer of at least 1".to_string(),
                })?,
        };

        Ok(Self {
            block_size: size(
                length("layout.block_width", d.block_size.width, false)?,
                length("layout.block_height", d.block_size.height, false)?,
            ),
            marker_size: size(
                length("layout.marker_width", d.marker_size.width, false)?,
                length("layout.marker_height", d.marker_size.height, false)?,
            ),
            padding: length("layout.padding", d.padding, true)?,
            gap_x: length("layout.gap_x", d.gap_x, true)?,
            gap_y: length("layout.gap_y", d.gap_y, true)?,
            lane_gap: length("layout.lane_gap", d.lane_gap, true)?,
            max_columns,
            branch_offset_step: length("layout.branch_offset_step", d.branch_offset_step, true)?,
            cycle_elbow_offset: length("layout.cycle_elbow_offset", d.cycle_elbow_offset, true)?,
            separators: config.get_bool("layout.separators").unwrap_or(d.separators),
            separator_padding: length("layout.separator_padding", d.separator_padding, true)?,
            separator_margin_x: length("layout.separator_margin_x", d.separator_margin_x, true)?,
            scenarios: config.get_bool("layout.scenarios").unwrap_or(d.scenarios),
            scenario: ScenarioConfig {
                width: length("layout.scenario_width", d.scenario.width, false)?,
                gap: length("layout.scenario_gap", d.scenario.gap, true)?,
                ..d.scenario
            },
        })
    }

    /// Vertical distance between two stacked components.
    pub fn component_gap(&self) -> f64 {
        if self.separators {
            self.lane_gap.max(self.separator_padding * 2.0)
        } else {
            self.lane_gap
        }
    }

    /// Vertical offset of the `ordinal`-th of `count` sibling connectors leaving one block.
    ///
    /// Symmetric around zero, so a lone connector stays straight.
    pub fn branch_offset(&self, ordinal: usize, count: usize) -> f64 {
        if count <= 1 {
            return 0.0;
        }
        (ordinal as f64 - (count as f64 - 1.0) / 2.0) * self.branch_offset_step
    }

    /// Horizontal room reserved left of column 0 for start markers.
    pub fn start_lane_width(&self) -> f64 {
        self.marker_size.width + self.gap_x * 0.8
    }

    pub fn column_pitch(&self) -> f64 {
        self.block_size.width + self.gap_x
    }

    pub fn row_pitch(&self) -> f64 {
        self.block_size.height + self.gap_y
    }
}
