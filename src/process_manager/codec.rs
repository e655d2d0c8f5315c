// File handoff encodings between the engine and the model executable

use crate::error::EngineError;
use crate::file_manager::{read_csv_table, write_csv_column};
use crate::models::input::TaskType;
use crate::models::plan::ChunkResult;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Encoding of one chunk's input file and decoding of its output file
pub trait ChunkCodec: Send + Sync {
    fn input_extension(&self) -> &'static str;
    fn output_extension(&self) -> &'static str;
    fn encode(&self, items: &[String], path: &Path) -> Result<(), EngineError>;
    fn decode(&self, path: &Path) -> Result<ChunkOutput, EngineError>;
}

pub fn codec_for(task_type: TaskType) -> &'static dyn ChunkCodec {
    match task_type {
        TaskType::Simple => &SimpleCodec,
        TaskType::Heavy => &HeavyCodec,
    }
}

/// What one invocation produced: text rows, or a typed numeric block for heavy output
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkOutput {
    Rows(ChunkResult),
    Heavy(HeavyBlock),
}

impl ChunkOutput {
    pub fn row_count(&self) -> usize {
        match self {
            ChunkOutput::Rows(result) => result.rows.len(),
            ChunkOutput::Heavy(block) => block.rows(),
        }
    }
}

/// Delimited text: `input` header plus one value per line in, header plus rows out
pub struct SimpleCodec;

impl ChunkCodec for SimpleCodec {
    fn input_extension(&self) -> &'static str {
        "csv"
    }

    fn output_extension(&self) -> &'static str {
        "csv"
    }

    fn encode(&self, items: &[String], path: &Path) -> Result<(), EngineError> {
        write_csv_column(path, "input", items)
    }

    fn decode(&self, path: &Path) -> Result<ChunkOutput, EngineError> {
        let (header, rows) = read_csv_table(path)?;
        Ok(ChunkOutput::Rows(ChunkResult { rows, header }))
    }
}

/// Numeric element type of a heavy buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Float32,
    Float64,
    Int32,
    Int64,
}

impl DType {
    pub fn width(&self) -> usize {
        match self {
            DType::Float32 | DType::Int32 => 4,
            DType::Float64 | DType::Int64 => 8,
        }
    }
}

/// Rust scalar that maps onto one `DType`
pub trait HeavyElement: Copy {
    const DTYPE: DType;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! heavy_element {
    ($ty:ty, $dtype:expr, $width:expr) => {
        impl HeavyElement for $ty {
            const DTYPE: DType = $dtype;

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut raw = [0u8; $width];
                raw.copy_from_slice(&bytes[..$width]);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

heavy_element!(f32, DType::Float32, 4);
heavy_element!(f64, DType::Float64, 8);
heavy_element!(i32, DType::Int32, 4);
heavy_element!(i64, DType::Int64, 8);

/// Metadata line preceding a heavy buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeavyDescriptor {
    pub dims: Vec<String>,
    pub shape: [usize; 2],
    pub dtype: DType,
}

/// Row-major little-endian elements in the dtype the model wrote them
#[derive(Debug, Clone, PartialEq)]
pub struct HeavyBlock {
    descriptor: HeavyDescriptor,
    data: Vec<u8>,
}

impl HeavyBlock {
    pub fn new(descriptor: HeavyDescriptor, data: Vec<u8>) -> Result<Self, EngineError> {
        let expected = byte_len(&descriptor)?;
        if data.len() != expected {
            return Err(EngineError::Codec(format!(
                "Heavy buffer holds {} bytes, shape {:?} of {:?} needs {}",
                data.len(),
                descriptor.shape,
                descriptor.dtype,
                expected
            )));
        }
        Ok(Self { descriptor, data })
    }

    /// Build a block from typed values, `cols` per row
    pub fn from_values<T: HeavyElement>(dims: Vec<String>, cols: usize, values: &[T]) -> Result<Self, EngineError> {
        if cols == 0 || values.len() % cols != 0 {
            return Err(EngineError::Codec(format!(
                "{} values do not fill rows of {} columns",
                values.len(),
                cols
            )));
        }
        let mut data = Vec::with_capacity(values.len() * T::DTYPE.width());
        for &value in values {
            value.write_le(&mut data);
        }
        let descriptor = HeavyDescriptor {
            dims,
            shape: [values.len() / cols, cols],
            dtype: T::DTYPE,
        };
        Self::new(descriptor, data)
    }

    pub fn descriptor(&self) -> &HeavyDescriptor {
        &self.descriptor
    }

    pub fn rows(&self) -> usize {
        self.descriptor.shape[0]
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Elements as `T`; `None` when the block holds another dtype
    pub fn values<T: HeavyElement>(&self) -> Option<Vec<T>> {
        if self.descriptor.dtype != T::DTYPE {
            return None;
        }
        Some(self.data.chunks_exact(T::DTYPE.width()).map(T::read_le).collect())
    }

    /// Append the rows of chunk `chunk`. Dims, dtype and width must agree; an empty dims list
    /// never overrides a non-empty one.
    pub fn append(&mut self, other: HeavyBlock, chunk: usize) -> Result<(), EngineError> {
        if other.descriptor.dtype != self.descriptor.dtype {
            return Err(EngineError::Codec(format!(
                "Chunk dtype {:?} differs from {:?}",
                other.descriptor.dtype, self.descriptor.dtype
            )));
        }
        if other.descriptor.shape[1] != self.descriptor.shape[1] {
            return Err(EngineError::Codec(format!(
                "Chunk width {} differs from {}",
                other.descriptor.shape[1], self.descriptor.shape[1]
            )));
        }
        if self.descriptor.dims.is_empty() {
            self.descriptor.dims = other.descriptor.dims;
        } else if !other.descriptor.dims.is_empty() && other.descriptor.dims != self.descriptor.dims {
            return Err(EngineError::InconsistentHeader { chunk });
        }
        self.descriptor.shape[0] += other.descriptor.shape[0];
        self.data.extend_from_slice(&other.data);
        Ok(())
    }
}

fn byte_len(descriptor: &HeavyDescriptor) -> Result<usize, EngineError> {
    let [rows, cols] = descriptor.shape;
    rows.checked_mul(cols)
        .and_then(|cells| cells.checked_mul(descriptor.dtype.width()))
        .ok_or_else(|| EngineError::Codec("Heavy shape overflows".to_string()))
}

#[derive(Debug, Serialize)]
struct HeavyInputMeta<'a> {
    columns: [&'a str; 1],
    count: usize,
}

/// Length-prefixed input and memory-mapped numeric output
pub struct HeavyCodec;

impl ChunkCodec for HeavyCodec {
    fn input_extension(&self) -> &'static str {
        "bin"
    }

    fn output_extension(&self) -> &'static str {
        "bin"
    }

    fn encode(&self, items: &[String], path: &Path) -> Result<(), EngineError> {
        let mut writer = BufWriter::new(File::create(path)?);
        let meta = HeavyInputMeta {
            columns: ["input"],
            count: items.len(),
        };
        serde_json::to_writer(&mut writer, &meta)
            .map_err(|e| EngineError::Codec(format!("Failed to write heavy metadata: {}", e)))?;
        writer.write_all(b"\n")?;

        for item in items {
            let bytes = item.as_bytes();
            let len = u32::try_from(bytes.len())
                .map_err(|_| EngineError::InvalidRequest(format!("Input of {} bytes is too large", bytes.len())))?;
            writer.write_all(&len.to_be_bytes())?;
            writer.write_all(bytes)?;
        }
        writer.flush()?;
        Ok(())
    }

    fn decode(&self, path: &Path) -> Result<ChunkOutput, EngineError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Err(EngineError::Codec(format!("Heavy output {:?} is empty", path)));
        }
        // SAFETY: the output file belongs to this invocation and is no longer written once
        // the model process has exited.
        let mmap = unsafe { Mmap::map(&file)? };
        decode_heavy_bytes(&mmap).map(ChunkOutput::Heavy)
    }
}

/// Split a heavy buffer into its metadata line and element bytes. Trailing bytes past the
/// declared shape are ignored.
pub fn decode_heavy_bytes(bytes: &[u8]) -> Result<HeavyBlock, EngineError> {
    let newline = bytes
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| EngineError::Codec("Heavy output has no metadata line".to_string()))?;

    let descriptor: HeavyDescriptor = serde_json::from_slice(&bytes[..newline])
        .map_err(|e| EngineError::Codec(format!("Invalid heavy metadata: {}", e)))?;

    let body = &bytes[newline + 1..];
    let expected = byte_len(&descriptor)?;
    if body.len() < expected {
        return Err(EngineError::Codec(format!(
            "Heavy buffer holds {} bytes, shape {:?} of {:?} needs {}",
            body.len(),
            descriptor.shape,
            descriptor.dtype,
            expected
        )));
    }

    HeavyBlock::new(descriptor, body[..expected].to_vec())
}

/// Metadata line followed by the block's elements, unchanged
pub fn encode_heavy_bytes(block: &HeavyBlock) -> Result<Vec<u8>, EngineError> {
    let mut out = serde_json::to_vec(block.descriptor())
        .map_err(|e| EngineError::Codec(format!("Failed to write heavy metadata: {}", e)))?;
    out.push(b'\n');
    out.extend_from_slice(block.data());
    Ok(out)
}
