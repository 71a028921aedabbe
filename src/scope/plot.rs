//! Offline PNG rendering of scope frames and harmonic spectra.
//!
//! Only lines and rectangles are drawn, so rendering needs no fonts.
use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;

use crate::scope::view::{PlotDescriptor, DIVISION_SPAN};
use crate::synth::model::ChannelKind;
use crate::synth::spectrum::HarmonicSpectrum;
use crate::synth::ScopeError;

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub grid: RGBColor,
    /// One color per phase; current traces use a dimmed variant.
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 400,
            background: RGBColor(10, 10, 10),
            grid: RGBColor(60, 60, 60),
            palette: vec![RGBColor(255, 200, 0), RGBColor(0, 200, 255), RGBColor(255, 80, 160)],
        }
    }
}

pub fn render_scope_png(plot: &PlotDescriptor, style: &PlotStyle) -> Result<Vec<u8>, ScopeError> {
    check_size(style)?;
    let (t0, t1) = plot.ranges.time;
    if !(t1 - t0).is_finite() || t1 <= t0 {
        return Err(ScopeError::Plot("empty time axis".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(t0..t1, DIVISION_SPAN.0..DIVISION_SPAN.1)?;

        // 8 x 10 division grid
        let grid = ShapeStyle::from(&style.grid).stroke_width(1);
        for i in 0..=8 {
            let x = t0 + (t1 - t0) * i as f64 / 8.0;
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, DIVISION_SPAN.0), (x, DIVISION_SPAN.1)],
                grid,
            )))?;
        }
        for div in -5..=5 {
            let y = div as f64;
            chart.draw_series(std::iter::once(PathElement::new(vec![(t0, y), (t1, y)], grid)))?;
        }

        let mut series: Vec<_> = plot.visible_series().collect();
        series.sort_by_key(|s| s.order);
        for s in series {
            let base = style.palette[s.phase_id as usize % style.palette.len()];
            let color = match s.channel_kind {
                ChannelKind::Voltage => base,
                ChannelKind::Current => dim(base),
            };
            let points = plot
                .time_labels
                .iter()
                .zip(&s.samples)
                .map(|(&t, &v)| (t, plot.to_divisions(s.channel_kind, v)));
            chart.draw_series(LineSeries::new(points, ShapeStyle::from(&color).stroke_width(2)))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

/// Bar chart of harmonic amplitudes in percent of the fundamental.
pub fn render_spectrum_png(
    spectrum: &HarmonicSpectrum,
    style: &PlotStyle,
) -> Result<Vec<u8>, ScopeError> {
    check_size(style)?;
    if spectrum.orders.is_empty() {
        return Err(ScopeError::Plot("spectrum has no orders".into()));
    }
    let max_order = spectrum.orders.iter().map(|(o, _)| *o).max().unwrap_or(1);
    let top = spectrum
        .orders
        .iter()
        .map(|(_, p)| *p)
        .fold(100.0f64, f64::max);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .build_cartesian_2d(0.0..(max_order as f64 + 1.0), 0.0..top * 1.05)?;
        let color = style.palette[0];
        chart.draw_series(spectrum.orders.iter().map(|&(order, percent)| {
            let x = order as f64;
            Rectangle::new([(x - 0.3, 0.0), (x + 0.3, percent)], color.filled())
        }))?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn dim(color: RGBColor) -> RGBColor {
    RGBColor(color.0 / 2 + 40, color.1 / 2 + 40, color.2 / 2 + 40)
}

fn check_size(style: &PlotStyle) -> Result<(), ScopeError> {
    if style.width == 0 || style.height == 0 || style.palette.is_empty() {
        return Err(ScopeError::Plot("invalid plot style".into()));
    }
    Ok(())
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ScopeError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| ScopeError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::config::{InstrumentSettings, ViewSettings};
    use crate::scope::transform::ViewportTransform;
    use crate::synth::model::{Channel, PhaseUnit, SystemSnapshot};
    use crate::synth::presets::Waveform;
    use crate::synth::spectrum::SpectrumAnalyzer;
    use crate::synth::synthesizer::channel_preview;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn scope_frame_renders_to_png() {
        let snapshot = SystemSnapshot::new(vec![PhaseUnit {
            id: 0,
            voltage: Some(Channel::new(90.0, 0.0, 50.0)),
            current: Some(Channel::new(40.0, 30.0, 50.0)),
        }]);
        let plot = ViewportTransform::new(InstrumentSettings::default())
            .compute(&snapshot, &ViewSettings::default());
        let style = PlotStyle {
            width: 200,
            height: 120,
            ..PlotStyle::default()
        };
        let png = render_scope_png(&plot, &style).unwrap();
        assert_eq!(png[..8], PNG_MAGIC);
    }

    #[test]
    fn spectrum_renders_and_rejects_empty_input() {
        let ch = Channel::new(100.0, 0.0, 50.0).with_harmonics(Waveform::Square.harmonics(3, 100.0));
        let trace = channel_preview(&ch, 4.0, 512, 230.0).unwrap();
        let spectrum = SpectrumAnalyzer::new(4, 8).analyze(&trace);
        let png = render_spectrum_png(&spectrum, &PlotStyle::default()).unwrap();
        assert_eq!(png[..8], PNG_MAGIC);

        let empty = HarmonicSpectrum {
            fundamental_peak: 0.0,
            orders: Vec::new(),
            thd: 0.0,
        };
        assert!(render_spectrum_png(&empty, &PlotStyle::default()).is_err());
    }
}
