//! Safetensors I/O for the matching pipeline.
//!
//! Reader: [`UnitRecording::load`] parses a safetensors file holding the
//! pre-extracted unit arrays (average waveforms, centroids, amplitudes,
//! spatial decay and the number of units per session).
//!
//! Writer: [`StWriter`] builds safetensors files from F64 and I32 tensors;
//! [`write_outcome`] stores the result of [`crate::run_matching`].
use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array, Array2, Array3, Array4, Dimension, IxDyn};
use std::collections::HashMap;
use std::path::Path;

use crate::drift::{DriftCorrection, UnitPositions};
use crate::session::SessionLayout;
use crate::{MatchOutcome, UnitData};

// ── Low-level safetensors parser ─────────────────────────────────────────────

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, serde_json::Value>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small");
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    ensure!(bytes.len() >= 8 + n, "safetensors header runs past end of file");
    let header: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
    Ok((header, 8 + n))
}

/// One tensor entry of the header, resolved against the data section.
struct Entry<'a> {
    dtype: &'a str,
    shape: Vec<usize>,
    raw: &'a [u8],
}

fn entry<'a>(
    header: &'a HashMap<String, serde_json::Value>,
    bytes: &'a [u8],
    data_start: usize,
    name: &str,
) -> Result<Entry<'a>> {
    let e = header.get(name).with_context(|| format!("missing '{name}' tensor"))?;
    let dtype = e["dtype"].as_str().with_context(|| format!("'{name}': missing dtype"))?;
    let shape = e["shape"]
        .as_array()
        .with_context(|| format!("'{name}': missing shape"))?
        .iter()
        .map(|v| v.as_u64().map(|x| x as usize))
        .collect::<Option<Vec<_>>>()
        .with_context(|| format!("'{name}': bad shape"))?;
    let offsets = e["data_offsets"]
        .as_array()
        .with_context(|| format!("'{name}': missing data_offsets"))?;
    let (s, end) = match (offsets.first().and_then(|v| v.as_u64()), offsets.get(1).and_then(|v| v.as_u64())) {
        (Some(s), Some(end)) => (data_start + s as usize, data_start + end as usize),
        _ => bail!("'{name}': bad data_offsets"),
    };
    ensure!(s <= end && end <= bytes.len(), "'{name}': data_offsets outside file");
    Ok(Entry { dtype, shape, raw: &bytes[s..end] })
}

fn read_f64_tensor(e: &Entry) -> Result<Vec<f64>> {
    Ok(match e.dtype {
        "F64" => e
            .raw
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "F32" => e
            .raw
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64)
            .collect(),
        other => bail!("expected F32 or F64 tensor, got {other}"),
    })
}

fn read_index_tensor(e: &Entry) -> Result<Vec<usize>> {
    let values: Vec<i64> = match e.dtype {
        "I64" => e
            .raw
            .chunks_exact(8)
            .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect(),
        "I32" => e
            .raw
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
            .collect(),
        other => bail!("expected I32 or I64 tensor, got {other}"),
    };
    values
        .into_iter()
        .map(|v| usize::try_from(v).context("negative unit count"))
        .collect()
}

fn read_array<D: Dimension>(
    header: &HashMap<String, serde_json::Value>,
    bytes: &[u8],
    data_start: usize,
    name: &str,
) -> Result<Array<f64, D>> {
    let e = entry(header, bytes, data_start, name)?;
    let data = read_f64_tensor(&e).with_context(|| format!("reading '{name}'"))?;
    let arr = Array::from_shape_vec(IxDyn(&e.shape), data).with_context(|| format!("'{name}': shape {:?}", e.shape))?;
    arr.into_dimensionality::<D>()
        .with_context(|| format!("'{name}': expected {} dims, got {:?}", D::NDIM.unwrap_or(0), e.shape))
}

// ── Public structs ────────────────────────────────────────────────────────────

/// Unit arrays loaded from a safetensors file.
///
/// | tensor              | shape                        |
/// |---------------------|------------------------------|
/// | `waveform`          | `[time, unit, 2]`            |
/// | `waw_per_tp`        | `[3, unit, time, 2]`         |
/// | `avg_centroid`      | `[3, unit, 2]`               |
/// | `amplitude`         | `[unit, 2]`                  |
/// | `spatial_decay`     | `[unit, 2]`                  |
/// | `units_per_session` | `[n_sessions]` (I32 or I64)  |
#[derive(Debug, Clone)]
pub struct UnitRecording {
    pub data: UnitData,
    pub positions: UnitPositions,
    pub units_per_session: Vec<usize>,
}

impl UnitRecording {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let (header, data_start) = parse_header(&bytes)?;

        let waveform: Array3<f64> = read_array(&header, &bytes, data_start, "waveform")?;
        let waw_per_tp: Array4<f64> = read_array(&header, &bytes, data_start, "waw_per_tp")?;
        let avg_centroid: Array3<f64> = read_array(&header, &bytes, data_start, "avg_centroid")?;
        let amplitude: Array2<f64> = read_array(&header, &bytes, data_start, "amplitude")?;
        let spatial_decay: Array2<f64> = read_array(&header, &bytes, data_start, "spatial_decay")?;

        let ups = entry(&header, &bytes, data_start, "units_per_session")?;
        let units_per_session = read_index_tensor(&ups).context("reading 'units_per_session'")?;

        let data = UnitData::new(waveform, amplitude, spatial_decay)?;
        let positions = UnitPositions::new(avg_centroid, waw_per_tp)?;
        ensure!(
            positions.n_units() == data.n_units(),
            "positions hold {} units, waveforms {}",
            positions.n_units(),
            data.n_units()
        );
        log::debug!(
            "loaded {} units over {} sessions from {}",
            data.n_units(),
            units_per_session.len(),
            path.display()
        );
        Ok(Self { data, positions, units_per_session })
    }

    pub fn layout(&self) -> Result<SessionLayout> {
        let layout = SessionLayout::from_units_per_session(&self.units_per_session)?;
        layout.check_units("units_per_session total", self.data.n_units())?;
        Ok(layout)
    }
}

// ── Generic safetensors builder ───────────────────────────────────────────────

/// Safetensors writer for unit recordings and match results.
///
/// Holds F64 score, position and drift tensors and I32 unit indices (match
/// pairs, units per session) in insertion order until [`StWriter::write`].
///
/// ```rust,no_run
/// use unitmatch::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("score", &[1.0, 0.5, 0.5, 1.0], &[2, 2]);
/// w.add_i32("units_per_session", &[1, 1], &[2]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Debug, Default)]
pub struct StWriter {
    tensors: Vec<OutTensor>,
}

#[derive(Debug)]
struct OutTensor {
    name: String,
    dtype: &'static str,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, name: &str, dtype: &'static str, shape: &[usize], bytes: Vec<u8>) {
        self.tensors.push(OutTensor { name: name.to_string(), dtype, shape: shape.to_vec(), bytes });
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        self.push(name, "F64", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    /// Any-dimensional array, written in logical (row-major) order.
    pub fn add_f64_array<D: Dimension>(&mut self, name: &str, arr: &Array<f64, D>) {
        let bytes = arr.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.push(name, "F64", arr.shape(), bytes);
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        self.push(name, "I32", shape, data.iter().flat_map(|v| v.to_le_bytes()).collect());
    }

    /// Header padded with spaces to a multiple of 8 bytes, then the
    /// tensor bytes back to back.
    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header = serde_json::Map::new();
        let mut offset = 0usize;
        for t in &self.tensors {
            let end = offset + t.bytes.len();
            header.insert(
                t.name.clone(),
                serde_json::json!({ "dtype": t.dtype, "shape": t.shape, "data_offsets": [offset, end] }),
            );
            offset = end;
        }
        let mut header = serde_json::to_vec(&header)?;
        header.resize(header.len().next_multiple_of(8), b' ');

        let mut f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        f.write_all(&(header.len() as u64).to_le_bytes())?;
        f.write_all(&header)?;
        for t in &self.tensors {
            f.write_all(&t.bytes)?;
        }
        log::debug!("wrote {} tensors ({offset} bytes) to {}", self.tensors.len(), path.display());
        Ok(())
    }
}

/// Write a unit recording; the inverse of [`UnitRecording::load`].
pub fn write_recording(rec: &UnitRecording, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_array("waveform", &rec.data.waveform);
    w.add_f64_array("waw_per_tp", &rec.positions.waw_per_tp);
    w.add_f64_array("avg_centroid", &rec.positions.avg_centroid);
    w.add_f64_array("amplitude", &rec.data.amplitude);
    w.add_f64_array("spatial_decay", &rec.data.spatial_decay);
    let ups = rec
        .units_per_session
        .iter()
        .map(|&n| i32::try_from(n).context("unit count does not fit in I32"))
        .collect::<Result<Vec<_>>>()?;
    w.add_i32("units_per_session", &ups, &[ups.len()]);
    w.write(path)
}

// ── Result writer ─────────────────────────────────────────────────────────────

/// Write the outcome of a matching run.
///
/// | tensor        | shape                       | content |
/// |---------------|-----------------------------|---------|
/// | `total_score` | `[unit, unit]`              | final total score |
/// | `predictors`  | `[unit, unit, n_scores]`    | selected scores |
/// | `matches`     | `[n_matches, 2]` I32        | deduplicated pairs |
/// | `threshold`   | `[2]`                       | applied and optimistic threshold |
/// | `drift`       | `[n_boundaries, k, 3]`      | drift per boundary and shank, NaN when skipped |
pub fn write_outcome(outcome: &MatchOutcome, path: &Path) -> Result<()> {
    let mut w = StWriter::new();
    w.add_f64_array("total_score", &outcome.total);
    w.add_f64_array("predictors", &outcome.predictors);

    let flat: Vec<i32> = outcome
        .matches
        .iter()
        .flat_map(|&(a, b)| [a, b])
        .map(|u| i32::try_from(u).context("unit index does not fit in I32"))
        .collect::<Result<_>>()?;
    w.add_i32("matches", &flat, &[outcome.matches.len(), 2]);
    w.add_f64("threshold", &[outcome.threshold.threshold, outcome.threshold.optimistic], &[2]);

    let reports: Vec<&[[f64; 3]]> = outcome
        .drift
        .iter()
        .map(|r| match &r.correction {
            DriftCorrection::Global(d) => std::slice::from_ref(d),
            DriftCorrection::PerShank(ds) => ds.as_slice(),
            DriftCorrection::Skipped => &[],
        })
        .collect();
    let k = reports.iter().map(|r| r.len()).max().unwrap_or(0).max(1);
    let mut drift = Array3::from_elem((reports.len(), k, 3), f64::NAN);
    for (b, vectors) in reports.iter().enumerate() {
        for (s, v) in vectors.iter().enumerate() {
            for (d, &x) in v.iter().enumerate() {
                drift[[b, s, d]] = x;
            }
        }
    }
    w.add_f64_array("drift", &drift);

    w.write(path)?;
    log::info!("wrote {} matches to {}", outcome.matches.len(), path.display());
    Ok(())
}
