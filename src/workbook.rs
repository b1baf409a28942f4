use std::collections::HashMap;

use calamine::{Data, Reader, Xlsx, open_workbook};
use camino::{Utf8Path, Utf8PathBuf};
use rust_xlsxwriter::Workbook;
use tracing::{debug, info};

use crate::error::KiraError;
use crate::workspace::Workspace;

/// Cell values of one sheet, row-major, as display strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    pub rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn from_rows<R, C>(rows: R) -> Self
    where
        R: IntoIterator<Item = C>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    pub fn header(&self) -> Option<&[String]> {
        self.rows.first().map(Vec::as_slice)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header()?.iter().position(|cell| cell == name)
    }

    /// Values of a named column below the first `skip_rows` rows.
    pub fn column_below(&self, name: &str, skip_rows: usize) -> Vec<&str> {
        let Some(index) = self.column_index(name) else {
            return Vec::new();
        };
        self.rows
            .iter()
            .skip(skip_rows)
            .map(|row| row.get(index).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// Named-sheet access to a workbook.
pub trait WorkbookStore {
    fn load_sheet(&self, name: &str) -> Result<Grid, KiraError>;
    fn save_sheet(&mut self, name: &str, grid: &Grid) -> Result<(), KiraError>;
}

/// Workbook kept in memory; sheet order follows insertion.
#[derive(Debug, Clone, Default)]
pub struct MemoryWorkbook {
    order: Vec<String>,
    sheets: HashMap<String, Grid>,
}

impl MemoryWorkbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, name: &str, grid: Grid) -> Self {
        self.insert(name, grid);
        self
    }

    pub fn insert(&mut self, name: &str, grid: Grid) {
        if !self.sheets.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.sheets.insert(name.to_string(), grid);
    }

    pub fn sheet(&self, name: &str) -> Option<&Grid> {
        self.sheets.get(name)
    }

    pub fn sheet_names(&self) -> &[String] {
        &self.order
    }
}

impl WorkbookStore for MemoryWorkbook {
    fn load_sheet(&self, name: &str) -> Result<Grid, KiraError> {
        self.sheets
            .get(name)
            .cloned()
            .ok_or_else(|| KiraError::SheetMissing {
                sheet: name.to_string(),
                workbook: "<memory>".to_string(),
            })
    }

    fn save_sheet(&mut self, name: &str, grid: &Grid) -> Result<(), KiraError> {
        self.insert(name, grid.clone());
        Ok(())
    }
}

/// An `.xlsx` file on disk. Every save re-reads the file and rewrites the
/// whole workbook with the one sheet replaced.
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    path: Utf8PathBuf,
}

impl XlsxWorkbook {
    pub fn open(path: &Utf8Path) -> Result<Self, KiraError> {
        if !path.as_std_path().exists() {
            return Err(KiraError::WorkbookNotFound(path.as_std_path().to_path_buf()));
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Opens `target`, first copying `template` there when it does not exist.
    pub fn create_or_copy(template: &Utf8Path, target: &Utf8Path) -> Result<Self, KiraError> {
        if !target.as_std_path().exists() {
            if !template.as_std_path().exists() {
                return Err(KiraError::WorkbookNotFound(
                    template.as_std_path().to_path_buf(),
                ));
            }
            info!(template = %template, target = %target, "creating workbook from template");
            Workspace::copy_file_atomic(template, target)?;
        }
        Self::open(target)
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn read_all(&self) -> Result<Vec<(String, Grid)>, KiraError> {
        let mut workbook: Xlsx<_> = open_workbook(self.path.as_std_path())
            .map_err(|err| KiraError::Workbook(format!("open {}: {err}", self.path)))?;
        let names = workbook.sheet_names();
        let mut sheets = Vec::with_capacity(names.len());
        for name in names {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|err| KiraError::Workbook(format!("read sheet '{name}': {err}")))?;
            sheets.push((name, grid_from_range(&range)));
        }
        Ok(sheets)
    }

    fn write_all(&self, sheets: &[(String, Grid)]) -> Result<(), KiraError> {
        let mut workbook = Workbook::new();
        for (name, grid) in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet
                .set_name(name)
                .map_err(|err| KiraError::Workbook(format!("sheet '{name}': {err}")))?;
            for (row_index, row) in grid.rows.iter().enumerate() {
                for (col_index, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    let row_index = u32::try_from(row_index)
                        .map_err(|_| KiraError::Workbook("too many rows".to_string()))?;
                    let col_index = u16::try_from(col_index)
                        .map_err(|_| KiraError::Workbook("too many columns".to_string()))?;
                    worksheet
                        .write_string(row_index, col_index, value)
                        .map_err(|err| KiraError::Workbook(err.to_string()))?;
                }
            }
        }

        let parent = self
            .path
            .parent()
            .ok_or_else(|| KiraError::Filesystem("invalid workbook path".to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix("kira-geo2hca-xlsx")
            .suffix(".xlsx")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        workbook
            .save(temp.path())
            .map_err(|err| KiraError::Workbook(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| KiraError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl WorkbookStore for XlsxWorkbook {
    fn load_sheet(&self, name: &str) -> Result<Grid, KiraError> {
        let mut workbook: Xlsx<_> = open_workbook(self.path.as_std_path())
            .map_err(|err| KiraError::Workbook(format!("open {}: {err}", self.path)))?;
        if !workbook.sheet_names().iter().any(|sheet| sheet == name) {
            return Err(KiraError::SheetMissing {
                sheet: name.to_string(),
                workbook: self.path.to_string(),
            });
        }
        let range = workbook
            .worksheet_range(name)
            .map_err(|err| KiraError::Workbook(format!("read sheet '{name}': {err}")))?;
        Ok(grid_from_range(&range))
    }

    fn save_sheet(&mut self, name: &str, grid: &Grid) -> Result<(), KiraError> {
        let mut sheets = self.read_all()?;
        match sheets.iter_mut().find(|(sheet, _)| sheet == name) {
            Some((_, existing)) => *existing = grid.clone(),
            None => sheets.push((name.to_string(), grid.clone())),
        }
        debug!(sheet = name, rows = grid.rows.len(), path = %self.path, "saving sheet");
        self.write_all(&sheets)
    }
}

/// calamine ranges start at the first used cell; pad back to A1.
fn grid_from_range(range: &calamine::Range<Data>) -> Grid {
    let Some((start_row, start_col)) = range.start() else {
        return Grid::default();
    };
    let mut rows: Vec<Vec<String>> = vec![Vec::new(); start_row as usize];
    for row in range.rows() {
        let mut cells = vec![String::new(); start_col as usize];
        cells.extend(row.iter().map(cell_to_string));
        while cells.last().is_some_and(String::is_empty) {
            cells.pop();
        }
        rows.push(cells);
    }
    while rows.last().is_some_and(Vec::is_empty) {
        rows.pop();
    }
    Grid { rows }
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_workbook_round_trip() {
        let mut workbook = MemoryWorkbook::new()
            .with_sheet("A", Grid::from_rows([["x", "y"]]))
            .with_sheet("B", Grid::default());
        workbook
            .save_sheet("A", &Grid::from_rows([["z"]]))
            .unwrap();

        assert_eq!(workbook.sheet_names(), ["A".to_string(), "B".to_string()]);
        assert_eq!(workbook.load_sheet("A").unwrap(), Grid::from_rows([["z"]]));
        assert!(workbook.load_sheet("C").is_err());
    }

    #[test]
    fn column_below_skips_header_block() {
        let grid = Grid::from_rows([
            vec!["ID", "NAME"],
            vec!["example", "ex"],
            vec!["GSM1", "one"],
            vec!["GSM2"],
        ]);
        assert_eq!(grid.column_below("ID", 2), vec!["GSM1", "GSM2"]);
        assert_eq!(grid.column_below("NAME", 2), vec!["one", ""]);
        assert!(grid.column_below("MISSING", 0).is_empty());
    }

    #[test]
    fn xlsx_save_replaces_one_sheet_and_keeps_others() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("book.xlsx")).unwrap();

        let mut seed = Workbook::new();
        seed.add_worksheet()
            .set_name("First")
            .unwrap()
            .write_string(0, 0, "keep")
            .unwrap();
        seed.add_worksheet()
            .set_name("Second")
            .unwrap()
            .write_number(1, 1, 9606.0)
            .unwrap();
        seed.save(path.as_std_path()).unwrap();

        let mut workbook = XlsxWorkbook::open(&path).unwrap();
        assert_eq!(
            workbook.load_sheet("Second").unwrap(),
            Grid::from_rows([vec![], vec!["", "9606"]])
        );

        workbook
            .save_sheet("Second", &Grid::from_rows([["replaced"]]))
            .unwrap();

        let sheets = workbook.read_all().unwrap();
        assert_eq!(sheets[0], ("First".to_string(), Grid::from_rows([["keep"]])));
        assert_eq!(
            sheets[1],
            ("Second".to_string(), Grid::from_rows([["replaced"]]))
        );
    }
}
