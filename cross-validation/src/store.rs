use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use common::{Error, Result};
use nalgebra::DMatrix;
use ndarray::{Array2, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

/// A keyed store of numeric arrays, addressed by subject and group name
pub trait ResultStore {
    /// Persist the arrays of a group, replacing what was stored before
    fn save(&self, subject: &str, group: &str, arrays: &BTreeMap<String, ArrayD<f64>>) -> Result<()>;

    /// Read the arrays of a group
    fn load(&self, subject: &str, group: &str) -> Result<BTreeMap<String, ArrayD<f64>>>;
}

/// Stores every group as `<root>/<subject>/<group>.json`
#[derive(Debug, Clone)]
pub struct JsonStore {
    root: PathBuf,
}

impl JsonStore {
    /// Store below the given directory, it is created on the first save
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// The root directory
    #[inline(always)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding a group
    pub fn path(&self, subject: &str, group: &str) -> PathBuf {
        self.root.join(subject).join(format!("{group}.json"))
    }
}

/// On disk layout of one array, row major with NaN as `null`
#[derive(Debug, Serialize, Deserialize)]
struct StoredArray {
    shape: Vec<usize>,
    data: Vec<Option<f64>>,
}

impl From<&ArrayD<f64>> for StoredArray {
    fn from(a: &ArrayD<f64>) -> Self {
        Self {
            shape: a.shape().to_vec(),
            data: a.iter().map(|v| if v.is_nan() { None } else { Some(*v) }).collect(),
        }
    }
}

impl TryFrom<StoredArray> for ArrayD<f64> {
    type Error = Error;

    fn try_from(stored: StoredArray) -> Result<Self> {
        let expected: usize = stored.shape.iter().product();
        let got = stored.data.len();
        let data = stored.data.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect();
        ArrayD::from_shape_vec(IxDyn(&stored.shape), data)
            .map_err(|_| Error::shape("stored array data length", expected, got))
    }
}

/// A two dimensional array with the rows and columns of the matrix
pub(crate) fn matrix_array(m: &DMatrix<f64>) -> ArrayD<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)]).into_dyn()
}

impl ResultStore for JsonStore {
    fn save(&self, subject: &str, group: &str, arrays: &BTreeMap<String, ArrayD<f64>>) -> Result<()> {
        let path = self.path(subject, group);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|source| Error::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
        let stored: BTreeMap<&String, StoredArray> =
            arrays.iter().map(|(k, a)| (k, StoredArray::from(a))).collect();
        let content = serde_json::to_string(&stored)?;
        fs::write(&path, content).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        debug!("wrote {} arrays to {:?}", arrays.len(), path);

        Ok(())
    }

    fn load(&self, subject: &str, group: &str) -> Result<BTreeMap<String, ArrayD<f64>>> {
        let path = self.path(subject, group);
        let content = fs::read_to_string(&path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        let stored: BTreeMap<String, StoredArray> = serde_json::from_str(&content)?;
        stored.into_iter().map(|(k, a)| Ok((k, ArrayD::try_from(a)?))).collect()
    }
}
