// Spreadsheet I/O: keyword sheets in, vectorized sheets out.
//
// reader turns the first worksheet of a workbook into a generic Table,
// model lifts that into typed KeywordRows (and any stored embedding columns),
// writer saves a Table plus appended embedding columns as .xlsx.

pub mod model;
pub mod reader;
pub mod table;
pub mod writer;
