//! The parameter container exchanged between the coordinator and its participants.
//!
//! Blob layout, all integers big endian:
//!
//! ```text
//! magic "FRPS" | version u8 | layers u32 | { rank u32 | dims u64 * rank | values f32le * prod(dims) } * layers
//! ```

use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::{Array1, ArrayD, IxDyn};

use crate::{Deserialize, Serialize};

/// A single layer's n-dimensional array of parameters.
pub type Tensor = ArrayD<f32>;

const MAGIC: [u8; 4] = *b"FRPS";
const VERSION: u8 = 1;

/// An ordered sequence of tensors, one per model layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    layers: Vec<Tensor>,
}

impl ParameterSet {
    /// Creates a new `ParameterSet`.
    ///
    /// # Arguments
    /// * `layers` - The tensors of the model, in layer order.
    pub fn new(layers: Vec<Tensor>) -> Self {
        Self { layers }
    }

    /// Builds a set out of flat per-layer vectors, each layer being a one dimensional tensor.
    pub fn from_vecs(layers: Vec<Vec<f32>>) -> Self {
        let layers = layers.into_iter().map(|l| Array1::from(l).into_dyn()).collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[Tensor] {
        &self.layers
    }

    pub fn into_layers(self) -> Vec<Tensor> {
        self.layers
    }

    /// The amount of layers.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether there are no layers or every layer holds no values.
    pub fn is_empty(&self) -> bool {
        self.layers.iter().all(|l| l.is_empty())
    }

    /// Returns the shape of every layer, in order.
    pub fn shape(&self) -> Vec<Vec<usize>> {
        self.layers.iter().map(|l| l.shape().to_vec()).collect()
    }

    /// The total amount of scalar parameters.
    pub fn num_params(&self) -> usize {
        self.layers.iter().map(|l| l.len()).sum()
    }

    /// The euclidean norm of all the parameters flattened together.
    pub fn l2_norm(&self) -> f64 {
        self.layers
            .iter()
            .flat_map(|l| l.iter())
            .map(|&v| (v as f64) * (v as f64))
            .sum::<f64>()
            .sqrt()
    }

    /// Checks that this set has exactly the layer count and per-layer shape of `expected`.
    ///
    /// # Arguments
    /// * `expected` - The reference shape, as returned by `ParameterSet::shape`.
    ///
    /// # Returns
    /// The first mismatch found, if any.
    pub fn check_shape(&self, expected: &[Vec<usize>]) -> Result<(), ShapeMismatch> {
        if self.layers.len() != expected.len() {
            return Err(ShapeMismatch::LayerCount {
                expected: expected.len(),
                got: self.layers.len(),
            });
        }

        for (layer, (tensor, shape)) in self.layers.iter().zip(expected).enumerate() {
            if tensor.shape() != shape.as_slice() {
                return Err(ShapeMismatch::LayerShape {
                    layer,
                    expected: shape.clone(),
                    got: tensor.shape().to_vec(),
                });
            }
        }

        Ok(())
    }
}

impl Serialize for ParameterSet {
    fn serialize(&self, buf: &mut Vec<u8>) -> io::Result<()> {
        let layers = u32::try_from(self.layers.len()).map_err(|_| too_large("layer count"))?;

        buf.reserve(9 + self.num_params() * size_of::<f32>());
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&layers.to_be_bytes());

        for layer in &self.layers {
            let rank = u32::try_from(layer.ndim()).map_err(|_| too_large("tensor rank"))?;
            buf.extend_from_slice(&rank.to_be_bytes());

            for &dim in layer.shape() {
                buf.extend_from_slice(&(dim as u64).to_be_bytes());
            }

            // Logical iteration order is row-major regardless of the memory layout.
            for &v in layer.iter() {
                buf.extend_from_slice(&v.to_le_bytes());
            }
        }

        Ok(())
    }
}

impl Deserialize for ParameterSet {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        let mut reader = Reader::new(buf);

        if reader.take(MAGIC.len())? != MAGIC {
            return Err(invalid("bad magic, not a parameter set blob"));
        }

        let version = reader.take(1)?[0];
        if version != VERSION {
            return Err(invalid(format!("unsupported parameter set version {version}")));
        }

        let nlayers = reader.u32()? as usize;
        let mut layers = Vec::with_capacity(nlayers.min(1024));

        for _ in 0..nlayers {
            let rank = reader.u32()? as usize;
            let mut dims = Vec::with_capacity(rank.min(16));

            for _ in 0..rank {
                let dim = usize::try_from(reader.u64()?).map_err(|_| invalid("dimension overflow"))?;
                dims.push(dim);
            }

            let count = dims
                .iter()
                .try_fold(1usize, |acc, &d| acc.checked_mul(d))
                .ok_or_else(|| invalid("element count overflow"))?;
            let nbytes = count
                .checked_mul(size_of::<f32>())
                .ok_or_else(|| invalid("element count overflow"))?;

            let values = reader
                .take(nbytes)?
                .chunks_exact(size_of::<f32>())
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();

            let tensor = Tensor::from_shape_vec(IxDyn(&dims), values).map_err(invalid)?;
            layers.push(tensor);
        }

        if !reader.is_done() {
            return Err(invalid(format!(
                "{} trailing bytes after parameter set",
                reader.remaining()
            )));
        }

        Ok(Self { layers })
    }
}

/// Sequential reader over a borrowed blob that fails on truncation.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                invalid(format!(
                    "truncated parameter set: wanted {n} bytes at offset {}, {} available",
                    self.pos,
                    self.remaining()
                ))
            })?;

        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> io::Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> io::Result<u64> {
        let mut bytes = [0; 8];
        bytes.copy_from_slice(self.take(8)?);
        Ok(u64::from_be_bytes(bytes))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_done(&self) -> bool {
        self.remaining() == 0
    }
}

fn invalid<E>(err: E) -> io::Error
where
    E: Into<Box<dyn Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, err)
}

fn too_large(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, format!("{what} does not fit the wire format"))
}

/// Returned whenever a parameter set doesn't have the expected layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeMismatch {
    LayerCount {
        expected: usize,
        got: usize,
    },
    LayerShape {
        layer: usize,
        expected: Vec<usize>,
        got: Vec<usize>,
    },
}

impl Display for ShapeMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LayerCount { expected, got } => {
                write!(f, "layer count mismatch: got {got}, expected {expected}")
            }
            Self::LayerShape {
                layer,
                expected,
                got,
            } => write!(
                f,
                "shape mismatch at layer {layer}: got {got:?}, expected {expected:?}"
            ),
        }
    }
}

impl Error for ShapeMismatch {}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn sample() -> ParameterSet {
        ParameterSet::new(vec![
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn(),
            array![0.5, -0.5, 0.25].into_dyn(),
        ])
    }

    fn encode(params: &ParameterSet) -> Vec<u8> {
        let mut buf = Vec::new();
        params.serialize(&mut buf).unwrap();
        buf
    }

    #[test]
    fn codec_preserves_shapes_and_values() {
        let params = sample();
        let decoded = ParameterSet::deserialize(&encode(&params)).unwrap();

        assert_eq!(decoded.shape(), vec![vec![2, 3], vec![3]]);
        assert_eq!(decoded, params);
    }

    #[test]
    fn transposed_layer_is_written_in_logical_order() {
        let t = array![[1.0, 2.0], [3.0, 4.0]].reversed_axes().into_dyn();
        let params = ParameterSet::new(vec![t.clone()]);

        let decoded = ParameterSet::deserialize(&encode(&params)).unwrap();
        assert_eq!(decoded.layers()[0], t);
    }

    #[test]
    fn bad_magic() {
        let mut buf = encode(&sample());
        buf[0] = b'X';

        let err = ParameterSet::deserialize(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn unknown_version() {
        let mut buf = encode(&sample());
        buf[4] = 9;

        assert!(ParameterSet::deserialize(&buf).is_err());
    }

    #[test]
    fn truncated() {
        let buf = encode(&sample());

        let err = ParameterSet::deserialize(&buf[..buf.len() - 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn trailing_bytes() {
        let mut buf = encode(&sample());
        buf.push(0);

        assert!(ParameterSet::deserialize(&buf).is_err());
    }

    #[test]
    fn huge_dimensions_do_not_allocate() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&u64::MAX.to_be_bytes());
        buf.extend_from_slice(&u64::MAX.to_be_bytes());

        assert!(ParameterSet::deserialize(&buf).is_err());
    }

    #[test]
    fn check_shape() {
        let params = sample();
        assert!(params.check_shape(&params.shape()).is_ok());

        let err = params.check_shape(&[vec![2, 3]]).unwrap_err();
        assert_eq!(err, ShapeMismatch::LayerCount { expected: 1, got: 2 });

        let err = params.check_shape(&[vec![3, 2], vec![3]]).unwrap_err();
        assert_eq!(
            err,
            ShapeMismatch::LayerShape {
                layer: 0,
                expected: vec![3, 2],
                got: vec![2, 3],
            }
        );
    }

    #[test]
    fn emptiness() {
        assert!(ParameterSet::default().is_empty());
        assert!(ParameterSet::from_vecs(vec![vec![]]).is_empty());
        assert!(!sample().is_empty());
    }

    #[test]
    fn norm() {
        let params = ParameterSet::from_vecs(vec![vec![3.0], vec![4.0]]);
        assert!((params.l2_norm() - 5.0).abs() < 1e-9);
    }
}
