use crate::errors::{RenderError, ShapDashError};
use hashbrown::HashMap;
use ordered_float::OrderedFloat;
use std::collections::HashSet;
use std::fmt::{self, Display};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

/// Contiguous Column Major Matrix data container.
///
/// This is the layout the tree learner and the explainer consume. Columns
/// are contiguous, so a feature can be sliced without copying.
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Indices into the data row-wise.
    pub index: Vec<usize>,
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        Matrix {
            data,
            index: (0..rows).collect(),
            rows,
            cols,
        }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.data.iter().skip(row).step_by(self.rows).copied().collect()
    }
}

/// A single cell value, used wherever cells must be compared, hashed or sorted.
///
/// Numbers are wrapped in `OrderedFloat` so grouping keys use exact equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Number(OrderedFloat<f64>),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(v) => Some(v.into_inner()),
            Scalar::Text(_) => None,
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(OrderedFloat(v))
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Number(v) => write!(f, "{}", v.into_inner()),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One named column of a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    /// The value at `row` as a comparable scalar.
    pub fn scalar(&self, row: usize) -> Scalar {
        match self {
            Column::Numeric(v) => Scalar::from(v[row]),
            Column::Categorical(v) => Scalar::Text(v[row].clone()),
        }
    }

    pub fn scalars(&self) -> Vec<Scalar> {
        (0..self.len()).map(|i| self.scalar(i)).collect()
    }

    /// Numeric view of the column.
    ///
    /// Categorical columns are coded by order of first appearance, starting at zero.
    pub fn to_numeric(&self) -> Vec<f64> {
        match self {
            Column::Numeric(v) => v.clone(),
            Column::Categorical(v) => {
                let mut codes: HashMap<&str, usize> = HashMap::new();
                v.iter()
                    .map(|s| {
                        let next = codes.len();
                        *codes.entry(s.as_str()).or_insert(next) as f64
                    })
                    .collect()
            }
        }
    }

    /// Number of distinct values, NaN counted once.
    pub fn n_distinct(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().map(|x| OrderedFloat(*x)).collect::<HashSet<_>>().len(),
            Column::Categorical(v) => v.iter().collect::<HashSet<_>>().len(),
        }
    }
}

/// An ordered collection of named, row-aligned columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    names: Vec<String>,
    columns: Vec<Column>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dataset from `(name, column)` pairs, validating lengths and names.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Column)>) -> Result<Self, ShapDashError> {
        let mut ds = Dataset::new();
        for (name, column) in columns {
            ds.push_column(name, column)?;
        }
        Ok(ds)
    }

    /// Append a column. It must match the current row count and have a fresh name.
    pub fn push_column<S: Into<String>>(&mut self, name: S, column: Column) -> Result<(), ShapDashError> {
        let name = name.into();
        if self.contains(&name) {
            return Err(ShapDashError::Schema(format!("duplicate column {}", name)));
        }
        if !self.columns.is_empty() && column.len() != self.rows() {
            return Err(ShapDashError::Schema(format!(
                "column {} has {} rows, expected {}",
                name,
                column.len(),
                self.rows()
            )));
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.names.iter().position(|n| n == name).map(|i| &self.columns[i])
    }

    /// Like [`Dataset::column`], but a missing column is a render error.
    pub fn require(&self, name: &str) -> Result<&Column, RenderError> {
        self.column(name)
            .ok_or_else(|| RenderError::MissingColumn(name.to_string(), "dataset".to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Column)> {
        self.names.iter().zip(self.columns.iter())
    }

    /// A new dataset holding only `names`, in that order.
    pub fn select(&self, names: &[String]) -> Result<Dataset, ShapDashError> {
        let mut ds = Dataset::new();
        for name in names {
            let column = self
                .column(name)
                .ok_or_else(|| ShapDashError::Schema(format!("column {} not found", name)))?;
            ds.push_column(name.clone(), column.clone())?;
        }
        Ok(ds)
    }

    /// A new dataset with the `excluded` columns dropped, order preserved.
    pub fn without(&self, excluded: &HashSet<String>) -> Dataset {
        let (names, columns): (Vec<String>, Vec<Column>) = self
            .iter()
            .filter(|(name, _)| !excluded.contains(*name))
            .map(|(n, c)| (n.clone(), c.clone()))
            .unzip();
        Dataset { names, columns }
    }

    /// Column major numeric buffer, suitable for [`Matrix::new`].
    ///
    /// Every column must be numeric; model features are never coded implicitly.
    pub fn to_column_major(&self) -> Result<Vec<f64>, ShapDashError> {
        let mut data = Vec::with_capacity(self.rows() * self.n_cols());
        for (name, column) in self.iter() {
            match column {
                Column::Numeric(v) => data.extend_from_slice(v),
                Column::Categorical(_) => {
                    return Err(ShapDashError::Schema(format!(
                        "model feature {} must be numeric, consider listing it in context_cols",
                        name
                    )))
                }
            }
        }
        Ok(data)
    }

    /// Read a CSV table with a header row.
    ///
    /// A column is numeric when every non-empty cell parses as `f64`, empty
    /// cells then become NaN. Any other column is categorical.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, ShapDashError> {
        let mut csv_reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.to_string()).collect();
        let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for result in csv_reader.records() {
            let record = result?;
            for (i, cell) in record.iter().enumerate().take(headers.len()) {
                raw[i].push(cell.trim().to_string());
            }
        }

        let mut ds = Dataset::new();
        for (name, cells) in headers.into_iter().zip(raw) {
            ds.push_column(name, infer_column(cells))?;
        }
        Ok(ds)
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, ShapDashError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| ShapDashError::UnableToRead(path.display().to_string(), e.to_string()))?;
        Self::from_csv_reader(BufReader::new(file))
    }

    pub fn to_csv_writer<W: Write>(&self, writer: W) -> Result<(), ShapDashError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(&self.names)?;
        for row in 0..self.rows() {
            let record: Vec<String> = self
                .columns
                .iter()
                .map(|c| match c {
                    Column::Numeric(v) if v[row].is_nan() => String::new(),
                    _ => c.scalar(row).to_string(),
                })
                .collect();
            csv_writer.write_record(&record)?;
        }
        csv_writer
            .flush()
            .map_err(|e| ShapDashError::UnableToWrite("csv".to_string(), e.to_string()))
    }

    pub fn to_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ShapDashError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ShapDashError::UnableToWrite(path.display().to_string(), e.to_string()))?;
        }
        let file =
            File::create(path).map_err(|e| ShapDashError::UnableToWrite(path.display().to_string(), e.to_string()))?;
        self.to_csv_writer(file)
    }
}

fn infer_column(cells: Vec<String>) -> Column {
    let parsed: Option<Vec<f64>> = cells
        .iter()
        .map(|c| if c.is_empty() { Some(f64::NAN) } else { c.parse::<f64>().ok() })
        .collect();
    match parsed {
        Some(values) => Column::Numeric(values),
        None => Column::Categorical(cells),
    }
}

/// Per-row, per-feature attribution values, aligned with the rows of a [`Dataset`].
#[derive(Debug, Clone, PartialEq)]
pub struct AttributionMatrix {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    rows: usize,
    expected_value: Option<f64>,
}

impl AttributionMatrix {
    /// Build from one vector per feature.
    pub fn new(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, ShapDashError> {
        if names.len() != columns.len() {
            return Err(ShapDashError::Schema(format!(
                "{} feature names for {} attribution columns",
                names.len(),
                columns.len()
            )));
        }
        let rows = columns.first().map_or(0, Vec::len);
        if let Some((name, col)) = names.iter().zip(columns.iter()).find(|(_, c)| c.len() != rows) {
            return Err(ShapDashError::Schema(format!(
                "attribution column {} has {} rows, expected {}",
                name,
                col.len(),
                rows
            )));
        }
        Ok(AttributionMatrix {
            names,
            columns,
            rows,
            expected_value: None,
        })
    }

    /// Build from a row major buffer of `rows * names.len()` values.
    pub fn from_row_major(names: Vec<String>, data: &[f64], rows: usize) -> Result<Self, ShapDashError> {
        let cols = names.len();
        if data.len() != rows * cols {
            return Err(ShapDashError::Schema(format!(
                "expected {} attribution values, found {}",
                rows * cols,
                data.len()
            )));
        }
        let columns = (0..cols)
            .map(|j| data.iter().skip(j).step_by(cols.max(1)).copied().collect())
            .collect();
        Self::new(names, columns)
    }

    pub fn with_expected_value(mut self, expected_value: f64) -> Self {
        self.expected_value = Some(expected_value);
        self
    }

    pub fn expected_value(&self) -> Option<f64> {
        self.expected_value
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// The attributions of one feature; a missing feature is a render error.
    pub fn column(&self, name: &str) -> Result<&[f64], RenderError> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| RenderError::MissingColumn(name.to_string(), "attribution matrix".to_string()))
    }

    /// Attributions of a single row, in feature order.
    pub fn row(&self, row: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[row]).collect()
    }

    /// Mean absolute attribution of each feature, in feature order.
    pub fn mean_abs(&self) -> Vec<f64> {
        self.columns
            .iter()
            .map(|c| {
                if c.is_empty() {
                    0.0
                } else {
                    c.iter().map(|v| v.abs()).sum::<f64>() / c.len() as f64
                }
            })
            .collect()
    }

    pub fn from_csv_path<P: AsRef<Path>>(path: P) -> Result<Self, ShapDashError> {
        let ds = Dataset::from_csv_path(path)?;
        Self::try_from(ds)
    }

    pub fn to_csv_path<P: AsRef<Path>>(&self, path: P) -> Result<(), ShapDashError> {
        Dataset::from(self).to_csv_path(path)
    }
}

impl TryFrom<Dataset> for AttributionMatrix {
    type Error = ShapDashError;

    fn try_from(ds: Dataset) -> Result<Self, Self::Error> {
        let mut columns = Vec::with_capacity(ds.n_cols());
        for (name, column) in ds.iter() {
            match column {
                Column::Numeric(v) => columns.push(v.clone()),
                Column::Categorical(_) => {
                    return Err(ShapDashError::Schema(format!("attribution column {} is not numeric", name)))
                }
            }
        }
        AttributionMatrix::new(ds.names, columns)
    }
}

impl From<&AttributionMatrix> for Dataset {
    fn from(m: &AttributionMatrix) -> Self {
        Dataset {
            names: m.names.clone(),
            columns: m.columns.iter().cloned().map(Column::Numeric).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_get() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get(0, 0), &1);
        assert_eq!(m.get(1, 0), &2);
        assert_eq!(m.get(2, 1), &7);
    }

    #[test]
    fn test_matrix_get_col() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_col(1), &vec![5, 6, 7]);
    }

    #[test]
    fn test_matrix_row() {
        let v = vec![1, 2, 3, 5, 6, 7];
        let m = Matrix::new(&v, 3, 2);
        assert_eq!(m.get_row(2), vec![3, 7]);
        assert_eq!(m.get_row(0), vec![1, 5]);
    }

    #[test]
    fn test_csv_type_inference() {
        let csv = "age,region,score\n34,north,1.5\n51,south,\n29,north,0.25\n";
        let ds = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
        assert_eq!(ds.rows(), 3);
        assert_eq!(ds.column_names(), &["age", "region", "score"]);
        assert_eq!(ds.column("age"), Some(&Column::Numeric(vec![34., 51., 29.])));
        assert!(!ds.column("region").unwrap().is_numeric());
        match ds.column("score").unwrap() {
            Column::Numeric(v) => assert!(v[1].is_nan()),
            Column::Categorical(_) => panic!("score should be numeric"),
        }
    }

    #[test]
    fn test_csv_roundtrip_through_file() {
        let ds = Dataset::from_columns(vec![
            ("x", Column::Numeric(vec![1.0, 2.5])),
            ("g", Column::Categorical(vec!["a".to_string(), "b".to_string()])),
        ])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("table.csv");
        ds.to_csv_path(&path).unwrap();
        assert_eq!(Dataset::from_csv_path(&path).unwrap(), ds);
    }

    #[test]
    fn test_push_column_rejects_misaligned_rows() {
        let mut ds = Dataset::new();
        ds.push_column("a", Column::Numeric(vec![1., 2.])).unwrap();
        assert!(ds.push_column("b", Column::Numeric(vec![1.])).is_err());
        assert!(ds.push_column("a", Column::Numeric(vec![3., 4.])).is_err());
    }

    #[test]
    fn test_without_and_select() {
        let ds = Dataset::from_columns(vec![
            ("a", Column::Numeric(vec![1.])),
            ("b", Column::Numeric(vec![2.])),
            ("c", Column::Numeric(vec![3.])),
        ])
        .unwrap();
        let excluded: HashSet<String> = ["b".to_string()].into_iter().collect();
        assert_eq!(ds.without(&excluded).column_names(), &["a", "c"]);
        let picked = ds.select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(picked.column_names(), &["c", "a"]);
        assert!(ds.select(&["z".to_string()]).is_err());
    }

    #[test]
    fn test_categorical_codes_follow_first_appearance() {
        let col = Column::Categorical(vec!["b".into(), "a".into(), "b".into(), "c".into()]);
        assert_eq!(col.to_numeric(), vec![0., 1., 0., 2.]);
        assert_eq!(col.n_distinct(), 3);
    }

    #[test]
    fn test_attribution_matrix_row_major() {
        let names = vec!["x".to_string(), "y".to_string()];
        let m = AttributionMatrix::from_row_major(names, &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6], 3).unwrap();
        assert_eq!(m.column("x").unwrap(), &[0.1, 0.3, 0.5]);
        assert_eq!(m.row(1), vec![0.3, 0.4]);
        assert_eq!(
            m.column("z"),
            Err(RenderError::MissingColumn("z".to_string(), "attribution matrix".to_string()))
        );
    }

    #[test]
    fn test_mean_abs() {
        let m = AttributionMatrix::new(
            vec!["x".to_string(), "y".to_string()],
            vec![vec![-1.0, 1.0], vec![0.5, -0.25]],
        )
        .unwrap();
        assert_eq!(m.mean_abs(), vec![1.0, 0.375]);
    }
}
