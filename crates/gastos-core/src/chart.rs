//! Pie chart of recorded expenses, drawn as SVG and rasterized to PNG.

use std::{
    f32::consts::PI,
    fs,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use resvg::{tiny_skia, usvg};
use svg::{
    node::element::{path::Data, Circle, Path as SvgPath, Rectangle, Text},
    Document,
};

use crate::{
    domain::{parse_amount, ExpenseRecord, SheetRecord, HEADER_AMOUNT, HEADER_DESCRIPTION},
    errors::Error,
    Result,
};

pub const CHART_TITLE: &str = "Distribuição de Gastos";

const WIDTH: f32 = 800.0;
const HEIGHT: f32 = 800.0;
const CENTER: (f32, f32) = (400.0, 430.0);
const RADIUS: f32 = 260.0;
const START_ANGLE_DEG: f32 = 140.0;
const LABEL_DISTANCE: f32 = 1.1;
const PERCENT_DISTANCE: f32 = 0.6;

/// Ten-color categorical palette, cycled per slice.
const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];

static CHART_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// One wedge of the pie, angles in degrees counter-clockwise from the +x axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub label: String,
    pub amount: f64,
    pub fraction: f64,
    pub start_deg: f32,
    pub sweep_deg: f32,
}

/// A rendered chart on local disk. The file is removed when this is dropped.
#[derive(Debug)]
pub struct ChartFile {
    path: PathBuf,
    removed: bool,
}

impl ChartFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn remove(mut self) -> Result<()> {
        self.removed = true;
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

impl Drop for ChartFile {
    fn drop(&mut self) {
        if !self.removed {
            let _ = fs::remove_file(&self.path);
        }
    }
}

#[derive(Clone, Debug)]
pub struct ChartRenderer {
    dir: PathBuf,
}

impl ChartRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A fresh file path for one request, so concurrent charts never share a file.
    pub fn next_path(&self) -> PathBuf {
        let ts = chrono::Utc::now().timestamp_millis();
        let n = CHART_COUNTER.fetch_add(1, Ordering::SeqCst);
        self.dir.join(format!("chart_{ts}_{n}.png"))
    }

    /// Render `records` as a pie chart at `path`, overwriting any existing file.
    pub fn generate(&self, records: &[SheetRecord], path: &Path) -> Result<ChartFile> {
        let expenses = chart_expenses(records)?;
        let document = render_document(&layout_slices(&expenses));
        fs::write(path, rasterize(&document)?)?;
        Ok(ChartFile {
            path: path.to_path_buf(),
            removed: false,
        })
    }
}

/// Rasterize the chart document to PNG bytes.
fn rasterize(document: &Document) -> Result<Vec<u8>> {
    let mut options = usvg::Options::default();
    options.fontdb_mut().load_system_fonts();

    let tree = usvg::Tree::from_str(&document.to_string(), &options)
        .map_err(|e| Error::External(format!("chart svg error: {e}")))?;
    let mut pixmap = tiny_skia::Pixmap::new(WIDTH as u32, HEIGHT as u32)
        .ok_or_else(|| Error::External("cannot allocate chart canvas".to_string()))?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|e| Error::External(format!("chart png error: {e}")))
}

/// Pick the amount/description columns and coerce amounts.
///
/// Rows whose amount does not parse (or is not positive) are dropped.
pub fn chart_expenses(records: &[SheetRecord]) -> Result<Vec<ExpenseRecord>> {
    let Some(first) = records.first() else {
        return Err(Error::Data(
            "A planilha está vazia. Adicione dados para gerar o gráfico.".to_string(),
        ));
    };

    let amount_key = find_column(first, HEADER_AMOUNT);
    let description_key = find_column(first, HEADER_DESCRIPTION);
    let (Some(amount_key), Some(description_key)) = (amount_key, description_key) else {
        return Err(Error::Data(format!(
            "A planilha deve conter as colunas '{HEADER_AMOUNT}' e '{HEADER_DESCRIPTION}'."
        )));
    };

    let expenses: Vec<ExpenseRecord> = records
        .iter()
        .filter_map(|rec| {
            // Comma decimals parse as in /list; zero and negative amounts are skipped.
            let amount = rec.get(&amount_key).and_then(|v| parse_amount(v))?;
            if amount <= 0.0 {
                return None;
            }
            let description = rec.get(&description_key).cloned().unwrap_or_default();
            Some(ExpenseRecord {
                amount,
                description,
            })
        })
        .collect();

    if expenses.is_empty() {
        return Err(Error::Data(
            "Nenhum dado válido encontrado para gerar o gráfico.".to_string(),
        ));
    }
    Ok(expenses)
}

fn find_column(record: &SheetRecord, wanted: &str) -> Option<String> {
    let wanted = wanted.trim().to_lowercase();
    record
        .keys()
        .find(|k| k.trim().to_lowercase() == wanted)
        .cloned()
}

pub fn layout_slices(expenses: &[ExpenseRecord]) -> Vec<Slice> {
    let total: f64 = expenses.iter().map(|e| e.amount).sum();
    let mut start = START_ANGLE_DEG;
    expenses
        .iter()
        .map(|e| {
            let fraction = if total > 0.0 { e.amount / total } else { 0.0 };
            let sweep = (fraction * 360.0) as f32;
            let slice = Slice {
                label: e.description.clone(),
                amount: e.amount,
                fraction,
                start_deg: start,
                sweep_deg: sweep,
            };
            start += sweep;
            slice
        })
        .collect()
}

/// Point on a circle of `radius` around the center; y grows downward in SVG.
fn polar(radius: f32, deg: f32) -> (f32, f32) {
    let rad = deg * PI / 180.0;
    (CENTER.0 + radius * rad.cos(), CENTER.1 - radius * rad.sin())
}

fn render_document(slices: &[Slice]) -> Document {
    let mut document = Document::new()
        .set("viewBox", (0, 0, WIDTH as i32, HEIGHT as i32))
        .set("width", WIDTH)
        .set("height", HEIGHT)
        .set("font-family", "sans-serif")
        .add(
            Rectangle::new()
                .set("width", WIDTH)
                .set("height", HEIGHT)
                .set("fill", "white"),
        )
        .add(
            Text::new(CHART_TITLE)
                .set("x", WIDTH / 2.0)
                .set("y", 60.0)
                .set("text-anchor", "middle")
                .set("font-size", 28),
        );

    for (idx, slice) in slices.iter().enumerate() {
        let color = PALETTE[idx % PALETTE.len()];

        if slice.sweep_deg >= 359.99 {
            document = document.add(
                Circle::new()
                    .set("cx", CENTER.0)
                    .set("cy", CENTER.1)
                    .set("r", RADIUS)
                    .set("fill", color),
            );
        } else {
            let from = polar(RADIUS, slice.start_deg);
            let to = polar(RADIUS, slice.start_deg + slice.sweep_deg);
            let large_arc = if slice.sweep_deg > 180.0 { 1.0 } else { 0.0 };
            let data = Data::new()
                .move_to(CENTER)
                .line_to(from)
                .elliptical_arc_to(vec![RADIUS, RADIUS, 0.0, large_arc, 0.0, to.0, to.1])
                .close();
            document = document.add(
                SvgPath::new()
                    .set("d", data)
                    .set("fill", color)
                    .set("stroke", "white")
                    .set("stroke-width", 1),
            );
        }

        let mid = slice.start_deg + slice.sweep_deg / 2.0;
        let (lx, ly) = polar(RADIUS * LABEL_DISTANCE, mid);
        let anchor = if (mid * PI / 180.0).cos() >= 0.0 {
            "start"
        } else {
            "end"
        };
        document = document.add(
            Text::new(slice.label.as_str())
                .set("x", lx)
                .set("y", ly)
                .set("text-anchor", anchor)
                .set("dominant-baseline", "middle")
                .set("font-size", 18),
        );

        let (px, py) = polar(RADIUS * PERCENT_DISTANCE, mid);
        document = document.add(
            Text::new(format!("{:.1}%", slice.fraction * 100.0))
                .set("x", px)
                .set("y", py)
                .set("text-anchor", "middle")
                .set("dominant-baseline", "middle")
                .set("font-size", 16),
        );
    }

    document
}
