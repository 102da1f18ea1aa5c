use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ErrorKind};
use crate::geometry::{PageFormat, PageGeometry, PageSide};

/// Tunables of the layout engine and of the render service. Every field has a default, so a
/// configuration file only needs to name what it overrides.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderConfiguration {
    /// Font size in points, about twice a normal reading size so that it matches the ruling.
    pub font_size: f32,
    /// Nominal side of a grid cell in millimeters.
    pub cell_size: f32,
    /// Default page margin in millimeters, also the origin of the grid.
    pub margin: f32,
    /// Minimum accepted text length in characters (after trimming).
    pub minimum_text_length: usize,
    /// Maximum accepted text length in characters (after trimming).
    pub maximum_text_length: usize,
    /// Number of threads of the render service.
    pub worker_count: usize,
    /// Use the cell-quantized margins even when the grid is not drawn.
    pub uniform_margins: bool,
    /// Gray level of the ruling, 0 is black and 1 is white.
    pub grid_line_gray: f32,
    /// Stroke width of the ruling in points.
    pub grid_line_width: f32,
    /// Distance of the underline rule below the baseline in points.
    pub underline_offset: f32,
    /// Stroke width of the underline rule in points.
    pub underline_width: f32,
    /// Horizontal shift of the second pass used to embolden text, in points.
    pub bold_offset: f32,
    /// Compress the streams of the PDF document before saving it.
    pub compress_output: bool,
}

impl Default for RenderConfiguration {
    fn default() -> Self {
        RenderConfiguration {
            font_size: 32.0,
            cell_size: 5.0,
            margin: 15.0,
            minimum_text_length: 3,
            maximum_text_length: 100_000,
            worker_count: 4,
            uniform_margins: true,
            grid_line_gray: 0.9,
            grid_line_width: 0.3,
            underline_offset: 1.5,
            underline_width: 0.7,
            bold_offset: 0.4,
            compress_output: true,
        }
    }
}

impl RenderConfiguration {
    pub fn from_path(configuration_file_path: &Path) -> Result<Self, ContextError> {
        let configuration_file_contents = std::fs::read_to_string(configuration_file_path)
            .map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Configuration,
                    format!(
                        "Failed to read the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        let configuration: RenderConfiguration =
            serde_json::from_str(&configuration_file_contents).map_err(|error| {
                ContextError::with_error(
                    ErrorKind::Configuration,
                    format!(
                        "Failed to parse the configuration file {:?}",
                        configuration_file_path
                    ),
                    &error,
                )
            })?;
        configuration.validate()?;

        Ok(configuration)
    }

    /// Rejects values the layout engine cannot work with.
    pub fn validate(&self) -> Result<(), ContextError> {
        let invalid = |context: &str| Err(ContextError::with_context(ErrorKind::Configuration, context));

        if !(self.font_size > 0.0) {
            return invalid("The font size must be positive");
        }
        if !(self.cell_size > 0.0) {
            return invalid("The cell size must be positive");
        }
        if !(self.margin >= 0.0) {
            return invalid("The margin must not be negative");
        }
        if self.minimum_text_length > self.maximum_text_length {
            return invalid("The minimum text length exceeds the maximum text length");
        }
        if self.worker_count == 0 {
            return invalid("At least one worker is required");
        }

        for page_format in [PageFormat::A4, PageFormat::A5] {
            let (width, height) = page_format.dimensions();
            if 2.0 * self.margin + self.cell_size > width.min(height) {
                return invalid(&format!(
                    "A margin of {} mm leaves no room for a single cell on {} pages",
                    self.margin, page_format
                ));
            }
            for grid_enabled in [true, false] {
                let geometry = PageGeometry::new(page_format, self, grid_enabled, PageSide::Right);
                if !(geometry.text_width() > 0.0) || geometry.first_baseline() > geometry.bottom_limit()
                {
                    return invalid(&format!(
                        "A margin of {} mm with {} mm cells leaves no room for text on {} pages",
                        self.margin, self.cell_size, page_format
                    ));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "fontSize": 28.0, "uniformMargins": false }}"#).unwrap();

        let configuration = RenderConfiguration::from_path(file.path()).unwrap();
        assert_eq!(configuration.font_size, 28.0);
        assert!(!configuration.uniform_margins);
        assert_eq!(configuration.cell_size, 5.0);
        assert_eq!(configuration.maximum_text_length, 100_000);
    }

    #[test]
    fn zero_workers_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "workerCount": 0 }}"#).unwrap();

        let error = RenderConfiguration::from_path(file.path()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn margins_must_leave_room_on_every_format() {
        for margin in [74.0, 60.0, 200.0] {
            let configuration = RenderConfiguration {
                margin,
                ..RenderConfiguration::default()
            };
            let error = configuration.validate().unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Configuration, "{}", margin);
        }

        let configuration = RenderConfiguration {
            margin: 25.0,
            ..RenderConfiguration::default()
        };
        assert!(configuration.validate().is_ok());
        assert!(RenderConfiguration::default().validate().is_ok());
    }

    #[test]
    fn missing_files_are_configuration_errors() {
        let error = RenderConfiguration::from_path(Path::new("/nonexistent/scribr.json")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Configuration);
    }
}
