//! CSV export of the filtered rows.

use serde::Deserialize;
use thiserror::Error;

use crate::columns::ColumnDescriptor;
use crate::model::AccountRow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportScope {
    #[default]
    Visible,
    All,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv buffer error: {0}")]
    Buffer(#[from] csv::IntoInnerError<csv::Writer<Vec<u8>>>),
    #[error("csv output is not utf-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub fn export_csv<'a, I>(rows: I, columns: &[&ColumnDescriptor]) -> Result<String, ExportError>
where
    I: IntoIterator<Item = &'a AccountRow>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns.iter().map(|col| col.header.as_str()))?;
    for row in rows {
        writer.write_record(columns.iter().map(|col| row.field(col.accessor)))?;
    }
    let bytes = writer.into_inner()?;
    Ok(String::from_utf8(bytes)?)
}
