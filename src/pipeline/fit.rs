//! Page fitting: map a surface's aspect ratio onto a page geometry.
//!
//! Pure geometry, no I/O. Two layouts exist:
//!
//! * [`FixedPage`]: a constant paper size (A4 by default) with a fixed margin
//!   on every edge; the page turns landscape for wide content and the content
//!   box is centred in the page. Used for raster and vector inputs, which
//!   differ in how wide a source must be to turn the sheet.
//! * [`FullBleed`]: the page *is* the content box: its size is the content's
//!   logical size, capped so it never exceeds the configured maximum. Used for
//!   markup, whose screenshots have no natural paper size.
//!
//! Every computation is plain `f64` arithmetic in a fixed order, so the same
//! inputs always produce bit-identical geometry.

use serde::{Deserialize, Serialize};

/// A4 width in millimetres.
pub const A4_WIDTH_MM: f64 = 210.0;
/// A4 height in millimetres.
pub const A4_HEIGHT_MM: f64 = 297.0;
/// A4 width in PostScript points.
pub const A4_WIDTH_PT: f64 = 595.28;
/// A4 height in PostScript points.
pub const A4_HEIGHT_PT: f64 = 841.89;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Portrait,
    Landscape,
}

impl Orientation {
    /// Landscape strictly above an aspect ratio of 1; square is portrait.
    pub fn for_aspect(aspect: f64) -> Self {
        if aspect > 1.0 {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }
}

/// Unit the page dimensions are expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageUnit {
    Mm,
    Pt,
}

impl PageUnit {
    /// Multiplier converting one unit into PostScript points.
    pub fn to_points(&self) -> f64 {
        match self {
            PageUnit::Mm => 72.0 / 25.4,
            PageUnit::Pt => 1.0,
        }
    }
}

/// Where and how large a surface is placed on its page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub orientation: Orientation,
    pub unit: PageUnit,
    pub page_width: f64,
    pub page_height: f64,
    pub content_width: f64,
    pub content_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl PageGeometry {
    pub fn content_aspect(&self) -> f64 {
        self.content_width / self.content_height
    }
}

/// Scale `source` into `budget`, preserving its aspect ratio.
///
/// Wider-than-budget content is capped on width, everything else on height,
/// so the result never exceeds either budget dimension.
pub fn fit_within(source_width: f64, source_height: f64, budget_width: f64, budget_height: f64) -> (f64, f64) {
    let source_aspect = source_width / source_height;
    let budget_aspect = budget_width / budget_height;
    if source_aspect > budget_aspect {
        (budget_width, budget_width / source_aspect)
    } else {
        (budget_height * source_aspect, budget_height)
    }
}

/// Constant paper size with a fixed margin on each edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixedPage {
    /// Portrait width of the sheet.
    pub width: f64,
    /// Portrait height of the sheet.
    pub height: f64,
    pub margin: f64,
    pub unit: PageUnit,
    /// Aspect ratio the source must exceed before the sheet turns landscape.
    pub landscape_above: f64,
    /// Whether the content budget turns with the sheet.
    ///
    /// When false the budget stays the portrait sheet minus its margins and
    /// only the offsets follow the turned sheet.
    pub rotate_budget: bool,
}

impl Default for FixedPage {
    fn default() -> Self {
        Self::a4()
    }
}

impl FixedPage {
    /// A4 in millimetres with a 10 mm margin, as used for photographs.
    ///
    /// Any source wider than tall turns the sheet; the content budget stays
    /// 190 × 277 mm either way.
    pub fn a4() -> Self {
        Self {
            width: A4_WIDTH_MM,
            height: A4_HEIGHT_MM,
            margin: 10.0,
            unit: PageUnit::Mm,
            landscape_above: 1.0,
            rotate_budget: false,
        }
    }

    /// A4 for drawings: near-square sources up to 1.2:1 stay portrait and
    /// the budget follows the turned sheet.
    pub fn a4_drawing() -> Self {
        Self {
            landscape_above: 1.2,
            rotate_budget: true,
            ..Self::a4()
        }
    }

    pub fn orientation(&self, source_width: f64, source_height: f64) -> Orientation {
        if source_width / source_height > self.landscape_above {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        }
    }

    pub fn fit(&self, source_width: f64, source_height: f64) -> PageGeometry {
        let orientation = self.orientation(source_width, source_height);
        let (page_width, page_height) = match orientation {
            Orientation::Portrait => (self.width, self.height),
            Orientation::Landscape => (self.height, self.width),
        };
        let (budget_width, budget_height) = if self.rotate_budget {
            (page_width, page_height)
        } else {
            (self.width, self.height)
        };
        let (content_width, content_height) = fit_within(
            source_width,
            source_height,
            budget_width - 2.0 * self.margin,
            budget_height - 2.0 * self.margin,
        );
        PageGeometry {
            orientation,
            unit: self.unit,
            page_width,
            page_height,
            content_width,
            content_height,
            offset_x: (page_width - content_width) / 2.0,
            offset_y: (page_height - content_height) / 2.0,
        }
    }
}

/// Page sized to the content itself, capped at a maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FullBleed {
    pub max_width: f64,
    pub max_height: f64,
    /// Aspect ratio deciding whether the width or the height cap applies.
    pub reference_aspect: f64,
    pub unit: PageUnit,
}

impl Default for FullBleed {
    fn default() -> Self {
        Self {
            max_width: 1200.0,
            max_height: 1700.0,
            reference_aspect: A4_WIDTH_PT / A4_HEIGHT_PT,
            unit: PageUnit::Pt,
        }
    }
}

impl FullBleed {
    pub fn fit(&self, source_width: f64, source_height: f64) -> PageGeometry {
        let aspect = source_width / source_height;
        let (mut width, mut height) = if aspect > self.reference_aspect {
            let w = source_width.min(self.max_width);
            (w, w / aspect)
        } else {
            let h = source_height.min(self.max_height);
            (h * aspect, h)
        };
        // Near the reference aspect the height-capped branch can overshoot the
        // width cap by a fraction of a unit.
        if width > self.max_width {
            width = self.max_width;
            height = width / aspect;
        }
        PageGeometry {
            orientation: Orientation::for_aspect(aspect),
            unit: self.unit,
            page_width: width,
            page_height: height,
            content_width: width,
            content_height: height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// Layout a renderer's surfaces are placed with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PageLayout {
    Fixed(FixedPage),
    FullBleed(FullBleed),
}

impl PageLayout {
    pub fn fit(&self, source_width: f64, source_height: f64) -> PageGeometry {
        match self {
            PageLayout::Fixed(page) => page.fit(source_width, source_height),
            PageLayout::FullBleed(bleed) => bleed.fit(source_width, source_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASPECTS: [f64; 5] = [0.5, 0.9, 1.0, 1.1, 2.0];

    fn rel_diff(a: f64, b: f64) -> f64 {
        ((a - b) / b).abs()
    }

    #[test]
    fn fit_within_caps_width_for_wide_content() {
        let (w, h) = fit_within(400.0, 100.0, 190.0, 277.0);
        assert_eq!(w, 190.0);
        assert_eq!(h, 47.5);
    }

    #[test]
    fn fit_within_caps_height_for_tall_content() {
        let (w, h) = fit_within(100.0, 400.0, 190.0, 277.0);
        assert_eq!(h, 277.0);
        assert_eq!(w, 69.25);
    }

    #[test]
    fn fixed_page_orientation() {
        let page = FixedPage::a4();
        let expected = [
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Landscape,
            Orientation::Landscape,
        ];
        for (aspect, want) in ASPECTS.iter().zip(expected) {
            let g = page.fit(1000.0 * aspect, 1000.0);
            assert_eq!(g.orientation, want, "aspect {aspect}");
        }
    }

    #[test]
    fn drawing_page_keeps_near_square_portrait() {
        let page = FixedPage::a4_drawing();
        let expected = [
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Landscape,
        ];
        for (aspect, want) in ASPECTS.iter().zip(expected) {
            let g = page.fit(1000.0 * aspect, 1000.0);
            assert_eq!(g.orientation, want, "aspect {aspect}");
        }
        // Strictly above the threshold.
        assert_eq!(page.fit(1200.0, 1000.0).orientation, Orientation::Portrait);
        assert_eq!(page.fit(1210.0, 1000.0).orientation, Orientation::Landscape);
    }

    #[test]
    fn full_bleed_orientation() {
        let bleed = FullBleed::default();
        let expected = [
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Portrait,
            Orientation::Landscape,
            Orientation::Landscape,
        ];
        for (aspect, want) in ASPECTS.iter().zip(expected) {
            let g = bleed.fit(1000.0 * aspect, 1000.0);
            assert_eq!(g.orientation, want, "aspect {aspect}");
        }
    }

    #[test]
    fn fixed_page_preserves_aspect_and_stays_inside_margins() {
        let page = FixedPage::a4();
        let sources = [
            (1.0, 1.0),
            (4000.0, 3000.0),
            (3000.0, 4000.0),
            (1920.0, 1080.0),
            (10.0, 5000.0),
            (5000.0, 10.0),
            (1234.5, 987.6),
        ];
        for (w, h) in sources {
            let g = page.fit(w, h);
            assert!(rel_diff(g.content_aspect(), w / h) < 1e-6, "{w}x{h}");
            assert!(g.content_width <= g.page_width - 2.0 * page.margin + 1e-9, "{w}x{h}");
            assert!(g.content_height <= g.page_height - 2.0 * page.margin + 1e-9, "{w}x{h}");
            assert!(g.offset_x >= page.margin - 1e-9);
            assert!(g.offset_y >= page.margin - 1e-9);
            // Centred.
            assert!((g.offset_x * 2.0 + g.content_width - g.page_width).abs() < 1e-9);
            assert!((g.offset_y * 2.0 + g.content_height - g.page_height).abs() < 1e-9);
        }
    }

    #[test]
    fn fixed_page_landscape_swaps_sheet() {
        let g = FixedPage::a4().fit(2000.0, 1000.0);
        assert_eq!(g.orientation, Orientation::Landscape);
        assert_eq!((g.page_width, g.page_height), (297.0, 210.0));
        assert_eq!(g.unit, PageUnit::Mm);
        // The budget stays the portrait 190 x 277 box.
        assert_eq!((g.content_width, g.content_height), (190.0, 95.0));
        assert_eq!((g.offset_x, g.offset_y), (53.5, 57.5));
    }

    #[test]
    fn drawing_page_budget_turns_with_sheet() {
        let g = FixedPage::a4_drawing().fit(2000.0, 1000.0);
        assert_eq!((g.page_width, g.page_height), (297.0, 210.0));
        assert_eq!((g.content_width, g.content_height), (277.0, 138.5));
        assert_eq!((g.offset_x, g.offset_y), (10.0, 35.75));
    }

    #[test]
    fn full_bleed_respects_caps() {
        let bleed = FullBleed::default();
        let sources = [
            (1200.0, 800.0),
            (5000.0, 1000.0),
            (1200.0, 9000.0),
            (600.0, 300.0),
            // Just under the reference aspect with a tall body.
            (1201.0, 1700.0),
            (1200.0, 1697.0),
        ];
        for (w, h) in sources {
            let g = bleed.fit(w, h);
            assert!(g.content_width <= 1200.0, "{w}x{h}: {g:?}");
            assert!(g.content_height <= 1700.0, "{w}x{h}: {g:?}");
            assert!(rel_diff(g.content_aspect(), w / h) < 1e-6, "{w}x{h}");
            assert_eq!(g.page_width, g.content_width);
            assert_eq!(g.page_height, g.content_height);
            assert_eq!((g.offset_x, g.offset_y), (0.0, 0.0));
        }
    }

    #[test]
    fn full_bleed_does_not_upscale_small_content() {
        let g = FullBleed::default().fit(600.0, 300.0);
        assert_eq!((g.page_width, g.page_height), (600.0, 300.0));
        assert_eq!(g.unit, PageUnit::Pt);
    }

    #[test]
    fn fitting_is_deterministic() {
        let a = FixedPage::a4().fit(1234.5, 987.6);
        let b = FixedPage::a4().fit(1234.5, 987.6);
        assert_eq!(a.content_width.to_bits(), b.content_width.to_bits());
        assert_eq!(a.offset_y.to_bits(), b.offset_y.to_bits());
    }
}
