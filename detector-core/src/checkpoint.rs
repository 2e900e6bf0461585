//! Model persistence.
//!
//! Neural detectors use a little-endian binary layout:
//!
//! ```text
//! "URLD" | version u32 | kind u8
//! vocab_size u32 | max_length u32 | embed_dim u32 | filters u32
//! hidden_dim u32 | hidden_layers u32 | n_kernels u32 | kernel u32 * n_kernels
//! dropout f32 | seed u64
//! n_tensors u32 | (rank u32 | dim u32 * rank | f32 * product(dims)) * n_tensors
//! ```
//!
//! Boosted models are stored as JSON.

use crate::boosting::GradientBoostedTrees;
use crate::config::Validate;
use crate::error::{DetectorError, Result};
use crate::model::{DetectorArgs, ModelKind, UrlClassifier, UrlDetector};
use bytemuck::cast_slice;
use memmap2::MmapOptions;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"URLD";
const VERSION: u32 = 1;

impl UrlDetector {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut f = BufWriter::new(File::create(path)?);
        let args = self.args();

        f.write_all(MAGIC)?;
        f.write_all(&VERSION.to_le_bytes())?;
        f.write_all(&[self.kind().code()])?;
        for v in [
            args.vocab_size,
            args.max_length,
            args.embed_dim,
            args.filters,
            args.hidden_dim,
            args.hidden_layers,
            args.kernel_sizes.len(),
        ] {
            f.write_all(&to_u32(v)?.to_le_bytes())?;
        }
        for &k in &args.kernel_sizes {
            f.write_all(&to_u32(k)?.to_le_bytes())?;
        }
        f.write_all(&args.dropout.to_le_bytes())?;
        f.write_all(&args.seed.to_le_bytes())?;

        let tensors = self.tensors();
        f.write_all(&to_u32(tensors.len())?.to_le_bytes())?;
        for t in tensors {
            f.write_all(&2u32.to_le_bytes())?;
            f.write_all(&to_u32(t.nrows())?.to_le_bytes())?;
            f.write_all(&to_u32(t.ncols())?.to_le_bytes())?;
            let data = t.as_standard_layout();
            match data.as_slice() {
                Some(values) if cfg!(target_endian = "little") => f.write_all(cast_slice(values))?,
                _ => {
                    for v in data.iter() {
                        f.write_all(&v.to_le_bytes())?;
                    }
                }
            }
        }
        f.flush()?;

        tracing::info!(
            "Saved {} ({} parameters) to {}",
            self.kind(),
            self.parameter_count(),
            path.display()
        );
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn load_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        // SAFETY: the map is read-only and dropped before returning.
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Self::from_bytes(&mmap[..])
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(bytes);
        if r.take(4)? != MAGIC {
            return Err(DetectorError::checkpoint("not a URL detector checkpoint"));
        }
        let version = r.u32()?;
        if version != VERSION {
            return Err(DetectorError::checkpoint(format!(
                "unsupported checkpoint version {version}"
            )));
        }
        let code = r.u8()?;
        let kind = ModelKind::from_code(code)
            .ok_or_else(|| DetectorError::checkpoint(format!("unknown model code {code}")))?;

        let vocab_size = r.usize()?;
        let max_length = r.usize()?;
        let embed_dim = r.usize()?;
        let filters = r.usize()?;
        let hidden_dim = r.usize()?;
        let hidden_layers = r.usize()?;
        let n_kernels = r.usize()?;
        if n_kernels > r.remaining() / 4 {
            return Err(DetectorError::checkpoint("kernel list exceeds file size"));
        }
        let kernel_sizes = (0..n_kernels).map(|_| r.usize()).collect::<Result<Vec<_>>>()?;
        let args = DetectorArgs {
            vocab_size,
            max_length,
            embed_dim,
            filters,
            kernel_sizes,
            hidden_dim,
            hidden_layers,
            dropout: r.f32()?,
            seed: r.u64()?,
        };

        // Reject headers whose model would not fit in the file before allocating it.
        args.validate()
            .map_err(|e| DetectorError::checkpoint(format!("invalid header: {e}")))?;
        let expected = args
            .tensor_elements(kind)
            .ok_or_else(|| DetectorError::checkpoint("model dimensions overflow"))?;
        if expected > r.remaining() / 4 {
            return Err(DetectorError::checkpoint(format!(
                "header describes {expected} values but only {} bytes remain",
                r.remaining()
            )));
        }
        let mut detector = UrlDetector::new(kind, args);
        let count = r.usize()?;
        let mut targets = detector.tensors_mut();
        if count != targets.len() {
            return Err(DetectorError::checkpoint(format!(
                "expected {} tensors, found {count}",
                targets.len()
            )));
        }
        for (i, target) in targets.iter_mut().enumerate() {
            let rank = r.u32()?;
            if rank != 2 {
                return Err(DetectorError::checkpoint(format!("tensor {i} has rank {rank}")));
            }
            let shape = (r.usize()?, r.usize()?);
            if shape != target.dim() {
                return Err(DetectorError::checkpoint(format!(
                    "tensor {i} has shape {shape:?}, expected {:?}",
                    target.dim()
                )));
            }
            let raw = r.take(target.len() * 4)?;
            for (dst, chunk) in target.iter_mut().zip(raw.chunks_exact(4)) {
                *dst = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            }
        }
        if r.remaining() != 0 {
            return Err(DetectorError::checkpoint(format!(
                "{} trailing bytes after tensors",
                r.remaining()
            )));
        }

        tracing::debug!("Loaded {} with {} parameters", kind, detector.parameter_count());
        Ok(detector)
    }
}

pub fn save_boosted<P: AsRef<Path>>(model: &GradientBoostedTrees, path: P) -> Result<()> {
    let path = path.as_ref();
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, model)?;
    tracing::info!("Saved boosted model ({} trees) to {}", model.n_trees(), path.display());
    Ok(())
}

pub fn load_boosted<P: AsRef<Path>>(path: P) -> Result<GradientBoostedTrees> {
    let text = std::fs::read_to_string(path.as_ref())?;
    Ok(serde_json::from_str(&text)?)
}

/// Load whichever model type `path` holds, sniffing the magic bytes.
pub fn load_classifier<P: AsRef<Path>>(path: P) -> Result<Box<dyn UrlClassifier>> {
    let path = path.as_ref();
    let mut head = [0u8; 4];
    let is_binary = {
        let mut f = File::open(path)?;
        f.read(&mut head)? == 4 && &head == MAGIC
    };
    if is_binary {
        Ok(Box::new(UrlDetector::load_mmap(path)?))
    } else {
        Ok(Box::new(load_boosted(path)?))
    }
}

fn to_u32(v: usize) -> Result<u32> {
    u32::try_from(v).map_err(|_| DetectorError::checkpoint(format!("{v} does not fit in u32")))
}

struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(DetectorError::checkpoint(format!(
                "truncated at byte {}: wanted {n} more",
                self.pos
            )));
        }
        let out = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn usize(&mut self) -> Result<usize> {
        Ok(self.u32()? as usize)
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }
}
