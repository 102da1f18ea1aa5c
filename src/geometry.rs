use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::configuration::RenderConfiguration;
use crate::error::{ContextError, ErrorKind};

/// Cells the wide (binding) margin spans past the grid origin.
pub const WIDE_MARGIN_CELLS: u32 = 4;
/// Cells the narrow margin spans past the grid origin.
pub const NARROW_MARGIN_CELLS: u32 = 2;
/// Visual correction of the wide margin on the small format, tuned by eye rather than derived.
pub const SMALL_FORMAT_WIDE_MARGIN_REDUCTION: u32 = 1;
/// The first baseline sits at the bottom of this cell, counted from the top margin.
pub const FIRST_BASELINE_CELLS: u32 = 3;
/// Line height and paragraph spacing, in grid cells: one for ink, one left blank.
pub const LINE_HEIGHT_CELLS: u32 = 2;

/// The two supported physical page sizes.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageFormat {
    A4,
    A5,
}

impl PageFormat {
    /// Width and height in millimeters.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::A5 => (148.0, 210.0),
        }
    }

    pub fn wide_margin_cells(self) -> u32 {
        match self {
            PageFormat::A4 => WIDE_MARGIN_CELLS,
            PageFormat::A5 => WIDE_MARGIN_CELLS - SMALL_FORMAT_WIDE_MARGIN_REDUCTION,
        }
    }
}

impl FromStr for PageFormat {
    type Err = ContextError;

    fn from_str(format: &str) -> Result<Self, Self::Err> {
        match format.trim().to_ascii_uppercase().as_str() {
            "A4" => Ok(PageFormat::A4),
            "A5" => Ok(PageFormat::A5),
            _ => Err(ContextError::with_context(
                ErrorKind::Validation,
                format!("Unsupported page format {:?}, expected A4 or A5", format),
            )),
        }
    }
}

impl std::fmt::Display for PageFormat {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageFormat::A4 => formatter.write_str("A4"),
            PageFormat::A5 => formatter.write_str("A5"),
        }
    }
}

/// Which side of a spread a page lands on once printed double-sided. Right pages carry the
/// wide margin on the left, where the binding is.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PageSide {
    Left,
    Right,
}

impl PageSide {
    pub fn opposite(self) -> PageSide {
        match self {
            PageSide::Left => PageSide::Right,
            PageSide::Right => PageSide::Left,
        }
    }

    /// The side of the page with the given 1-based number.
    pub fn of_page(page_number: usize, first_page_side: PageSide) -> PageSide {
        if page_number % 2 == 1 {
            first_page_side
        } else {
            first_page_side.opposite()
        }
    }
}

impl FromStr for PageSide {
    type Err = ContextError;

    fn from_str(side: &str) -> Result<Self, Self::Err> {
        match side.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(PageSide::Left),
            "right" => Ok(PageSide::Right),
            _ => Err(ContextError::with_context(
                ErrorKind::Validation,
                format!("Unsupported page side {:?}, expected left or right", side),
            )),
        }
    }
}

/// The cells of the ruling. Actual cell sizes are stretched so that the cells exactly fill the
/// area inside the margins.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct Grid {
    pub cell_count_x: u32,
    pub cell_count_y: u32,
    pub actual_cell_width: f32,
    pub actual_cell_height: f32,
}

pub fn compute_grid(page_width: f32, page_height: f32, cell_size: f32, margin: f32) -> Grid {
    let printable_width = page_width - 2.0 * margin;
    let printable_height = page_height - 2.0 * margin;
    let cell_count_x = ((printable_width / cell_size).floor() as u32).max(1);
    let cell_count_y = ((printable_height / cell_size).floor() as u32).max(1);

    Grid {
        cell_count_x,
        cell_count_y,
        actual_cell_width: printable_width / cell_count_x as f32,
        actual_cell_height: printable_height / cell_count_y as f32,
    }
}

/// Distances of the text from the left and right page edges, in millimeters.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct Margins {
    pub left: f32,
    pub right: f32,
}

/// Mirrored margins for double-sided printing. Quantized margins are whole cells past the grid
/// origin, plain ones are multiples of the default margin.
pub fn compute_margins(
    page_number: usize,
    first_page_side: PageSide,
    grid: &Grid,
    quantized: bool,
    default_margin: f32,
    page_format: PageFormat,
) -> Margins {
    let (wide, narrow) = if quantized {
        (
            default_margin + page_format.wide_margin_cells() as f32 * grid.actual_cell_width,
            default_margin + NARROW_MARGIN_CELLS as f32 * grid.actual_cell_width,
        )
    } else {
        (1.5 * default_margin, default_margin)
    };

    match PageSide::of_page(page_number, first_page_side) {
        PageSide::Right => Margins {
            left: wide,
            right: narrow,
        },
        PageSide::Left => Margins {
            left: narrow,
            right: wide,
        },
    }
}

/// A straight segment of the ruling, with the y axis pointing down from the top of the page.
#[derive(Debug, Serialize, Clone, Copy, PartialEq)]
pub struct RulingLine {
    pub from: (f32, f32),
    pub to: (f32, f32),
}

/// Everything the layout needs to know about the pages of one render, computed once per render.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct PageGeometry {
    pub format: PageFormat,
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub grid: Grid,
    pub grid_enabled: bool,
    pub quantized_margins: bool,
    pub first_page_side: PageSide,
    pub line_height: f32,
    pub paragraph_spacing: f32,
}

impl PageGeometry {
    pub fn new(
        format: PageFormat,
        configuration: &RenderConfiguration,
        grid_enabled: bool,
        first_page_side: PageSide,
    ) -> Self {
        let (width, height) = format.dimensions();
        let grid = compute_grid(width, height, configuration.cell_size, configuration.margin);
        let line_height = LINE_HEIGHT_CELLS as f32 * grid.actual_cell_height;

        PageGeometry {
            format,
            width,
            height,
            margin: configuration.margin,
            grid,
            grid_enabled,
            quantized_margins: grid_enabled || configuration.uniform_margins,
            first_page_side,
            line_height,
            paragraph_spacing: line_height,
        }
    }

    pub fn margins(&self, page_number: usize) -> Margins {
        compute_margins(
            page_number,
            self.first_page_side,
            &self.grid,
            self.quantized_margins,
            self.margin,
            self.format,
        )
    }

    /// Width available to a line. Wide plus narrow is the same on both sides of a spread, so it
    /// does not depend on the page.
    pub fn text_width(&self) -> f32 {
        let margins = self.margins(1);
        self.width - margins.left - margins.right
    }

    /// Baseline of the first line of a page, from the top.
    pub fn first_baseline(&self) -> f32 {
        self.margin + FIRST_BASELINE_CELLS as f32 * self.grid.actual_cell_height
    }

    /// Lowest baseline a line may be drawn at, from the top.
    pub fn bottom_limit(&self) -> f32 {
        self.height - self.margin - self.line_height
    }

    /// The horizontal and vertical rules of the grid, bounded by the default margin.
    pub fn ruling(&self) -> Vec<RulingLine> {
        let left = self.margin;
        let right = self.width - self.margin;
        let top = self.margin;
        let bottom = self.height - self.margin;

        let horizontal = (0..=self.grid.cell_count_y).map(|row| {
            let y = top + row as f32 * self.grid.actual_cell_height;
            RulingLine {
                from: (left, y),
                to: (right, y),
            }
        });
        let vertical = (0..=self.grid.cell_count_x).map(|column| {
            let x = left + column as f32 * self.grid.actual_cell_width;
            RulingLine {
                from: (x, top),
                to: (x, bottom),
            }
        });

        horizontal.chain(vertical).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-3
    }

    #[test]
    fn grid_cells_fill_the_printable_area() {
        for format in [PageFormat::A4, PageFormat::A5] {
            let (width, height) = format.dimensions();
            for cell_size in [3.0, 4.5, 5.0, 7.0, 10.0] {
                for margin in [0.0, 10.0, 15.0] {
                    let grid = compute_grid(width, height, cell_size, margin);
                    let filled_width = grid.cell_count_x as f32 * grid.actual_cell_width;
                    let filled_height = grid.cell_count_y as f32 * grid.actual_cell_height;
                    assert!(close(filled_width, width - 2.0 * margin));
                    assert!(close(filled_height, height - 2.0 * margin));
                    assert!(grid.actual_cell_width >= cell_size);
                    assert!(grid.actual_cell_height >= cell_size);
                }
            }
        }
    }

    #[test]
    fn a4_grid_with_default_cells() {
        let grid = compute_grid(210.0, 297.0, 5.0, 15.0);
        assert_eq!(grid.cell_count_x, 36);
        assert_eq!(grid.cell_count_y, 53);
        assert!(close(grid.actual_cell_width, 5.0));
        assert!(close(grid.actual_cell_height, 267.0 / 53.0));
    }

    #[test]
    fn margins_alternate_with_the_page_parity() {
        let grid = compute_grid(210.0, 297.0, 5.0, 15.0);
        let margins = |page_number, side| {
            compute_margins(page_number, side, &grid, true, 15.0, PageFormat::A4)
        };

        let first = margins(1, PageSide::Right);
        assert!(close(first.left, 35.0));
        assert!(close(first.right, 25.0));
        let second = margins(2, PageSide::Right);
        assert!(close(second.left, 25.0));
        assert!(close(second.right, 35.0));

        assert_eq!(margins(1, PageSide::Left), second);
        assert_eq!(margins(3, PageSide::Right), first);
    }

    #[test]
    fn the_small_format_has_a_narrower_binding_margin() {
        let (width, height) = PageFormat::A5.dimensions();
        let grid = compute_grid(width, height, 5.0, 15.0);
        let margins = compute_margins(1, PageSide::Right, &grid, true, 15.0, PageFormat::A5);

        assert!(close(margins.left, 15.0 + 3.0 * grid.actual_cell_width));
        assert!(close(margins.right, 15.0 + 2.0 * grid.actual_cell_width));
    }

    #[test]
    fn plain_margins_are_multiples_of_the_default() {
        let grid = compute_grid(210.0, 297.0, 5.0, 15.0);
        let margins = compute_margins(1, PageSide::Right, &grid, false, 15.0, PageFormat::A4);
        assert_eq!(margins, Margins { left: 22.5, right: 15.0 });
    }

    #[test]
    fn toggling_the_grid_keeps_the_text_frame_with_uniform_margins() {
        let configuration = RenderConfiguration::default();
        for format in [PageFormat::A4, PageFormat::A5] {
            let with_grid = PageGeometry::new(format, &configuration, true, PageSide::Right);
            let without_grid = PageGeometry::new(format, &configuration, false, PageSide::Right);

            assert_eq!(with_grid.text_width(), without_grid.text_width());
            assert_eq!(with_grid.line_height, without_grid.line_height);
            assert_eq!(with_grid.margins(2), without_grid.margins(2));
        }

        let plain = RenderConfiguration {
            uniform_margins: false,
            ..RenderConfiguration::default()
        };
        let without_grid = PageGeometry::new(PageFormat::A4, &plain, false, PageSide::Right);
        assert!(close(without_grid.text_width(), 210.0 - 37.5));
    }

    #[test]
    fn text_width_is_the_same_on_both_sides() {
        let geometry = PageGeometry::new(
            PageFormat::A5,
            &RenderConfiguration::default(),
            true,
            PageSide::Left,
        );
        let odd = geometry.margins(1);
        let even = geometry.margins(2);
        assert!(close(odd.left + odd.right, even.left + even.right));
    }

    #[test]
    fn the_ruling_is_bounded_by_the_margin() {
        let geometry = PageGeometry::new(
            PageFormat::A4,
            &RenderConfiguration::default(),
            true,
            PageSide::Right,
        );
        let ruling = geometry.ruling();
        assert_eq!(ruling.len(), 54 + 37);

        let last_row = ruling[53];
        assert!(close(last_row.from.1, 297.0 - 15.0));
        let last_column = ruling[ruling.len() - 1];
        assert!(close(last_column.from.0, 210.0 - 15.0));
    }

    #[test]
    fn formats_and_sides_parse_case_insensitively() {
        assert_eq!("a5".parse::<PageFormat>().unwrap(), PageFormat::A5);
        assert_eq!(" A4 ".parse::<PageFormat>().unwrap(), PageFormat::A4);
        assert_eq!("Left".parse::<PageSide>().unwrap(), PageSide::Left);

        let error = "letter".parse::<PageFormat>().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert_eq!("up".parse::<PageSide>().unwrap_err().kind(), ErrorKind::Validation);
    }
}
