//! Results output formatting (CSV).

use std::io::Write;

use crate::error::Result;
use crate::record::ResultRecord;

/// Write result records as CSV, one row per record.
///
/// Format:
/// ```csv
/// time,sweep,seed,N1,N2
/// 0,1,1,0.8,0
/// 0.00000000001,1,1,0.79,0.01
/// ```
///
/// Columns follow `signals`; a signal missing from a partial record leaves
/// its cell empty.
pub fn write_records_csv<W: Write>(
    records: &[ResultRecord],
    signals: &[String],
    writer: &mut W,
) -> Result<()> {
    write!(writer, "time,sweep,seed")?;
    for name in signals {
        write!(writer, ",{}", name)?;
    }
    writeln!(writer)?;

    for record in records {
        write!(writer, "{},{},{}", record.time, record.sweep, record.seed)?;
        for name in signals {
            match record.get(name) {
                Some(v) => write!(writer, ",{}", v)?,
                None => write!(writer, ",")?,
            }
        }
        writeln!(writer)?;
    }
    Ok(())
}
