use std::fmt;

use super::blob::{decode_signed, decode_unsigned};
use super::metadata::TableType;
use super::{FormatError, FormatErrorKind, PortablePdb};

/// The line number of hidden sequence points.
pub const HIDDEN_LINE: u32 = 0xfeefee;

/// A row of the `MethodDebugInformation` table with its sequence points decoded.
#[derive(Debug, Clone, Default)]
pub(crate) struct MethodDebugRecord {
    /// The `StandAloneSig` row of the method's local signature, or 0.
    pub(crate) local_signature: u32,
    pub(crate) sequence_points: Vec<SequencePoint>,
}

impl<'data> PortablePdb<'data> {
    /// Decodes the debug information of the method with the given `MethodDef` row.
    ///
    /// Methods without a `MethodDebugInformation` row, or with an empty sequence points blob,
    /// yield an empty record.
    pub(crate) fn get_method_debug_info(
        &self,
        idx: usize,
    ) -> Result<MethodDebugRecord, FormatError> {
        if idx > self.row_count(TableType::MethodDebugInformation) {
            return Ok(MethodDebugRecord::default());
        }
        let row = self
            .get_table(TableType::MethodDebugInformation)?
            .get_row(idx)?;
        let document = row.get_col_u32(1)?;
        let offset = row.get_col_u32(2)?;
        if offset == 0 {
            return Ok(MethodDebugRecord::default());
        }
        let data = self.get_blob(offset)?;
        parse_sequence_points(data, document)
            .map_err(|e| FormatError::new(FormatErrorKind::InvalidSequencePoint, e))
    }
}

/// Parses a sequence points blob.
///
/// See https://github.com/dotnet/runtime/blob/main/docs/design/specs/PortablePdb-Metadata.md#sequence-points-blob.
fn parse_sequence_points(data: &[u8], document: u32) -> Result<MethodDebugRecord, FormatError> {
    let (local_signature, mut data) = decode_unsigned(data)?;
    let mut current_document = match document {
        0 => {
            let (initial_document, rest) = decode_unsigned(data)?;
            data = rest;
            initial_document
        }
        _ => document,
    };

    let mut sequence_points: Vec<SequencePoint> = Vec::new();
    let mut last_nonhidden: Option<SequencePoint> = None;

    while !data.is_empty() {
        // A zero IL delta after the first record switches to another document.
        if !sequence_points.is_empty() && data[0] == 0 {
            let (doc, rest) = decode_unsigned(&data[1..])?;
            current_document = doc;
            data = rest;
            continue;
        }

        let (sequence_point, rest) = SequencePoint::parse(
            data,
            sequence_points.last().copied(),
            last_nonhidden,
            current_document,
        )?;
        data = rest;

        sequence_points.push(sequence_point);
        if !sequence_point.is_hidden() {
            last_nonhidden = Some(sequence_point);
        }
    }

    Ok(MethodDebugRecord {
        local_signature,
        sequence_points,
    })
}

/// A mapping of an IL offset to a source range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SequencePoint {
    /// The IL offset of the first instruction covered by this point.
    pub il_offset: u32,
    /// The first line of the source range, [`HIDDEN_LINE`] for hidden points.
    pub start_line: u32,
    /// The first column of the source range.
    pub start_column: u32,
    /// The last line of the source range, [`HIDDEN_LINE`] for hidden points.
    pub end_line: u32,
    /// The column after the source range.
    pub end_column: u32,
    /// The 0-based index of the document, in the order of the `Document` table.
    pub document: usize,
}

impl SequencePoint {
    /// Returns true if this is a "hidden" sequence point.
    pub fn is_hidden(&self) -> bool {
        self.start_line == HIDDEN_LINE
            && self.end_line == HIDDEN_LINE
            && self.start_column == 0
            && self.end_column == 0
    }

    fn new(
        il_offset: u32,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        document_id: u32,
    ) -> Result<Self, FormatError> {
        if il_offset >= 0x20000000
            || start_line >= 0x20000000
            || end_line >= 0x20000000
            || start_column >= 0x10000
            || end_column >= 0x10000
            || start_line == HIDDEN_LINE
            || end_line == HIDDEN_LINE
            || end_line < start_line
            || (end_line == start_line && end_column <= start_column)
        {
            Err(FormatErrorKind::InvalidSequencePoint.into())
        } else {
            Ok(Self {
                il_offset,
                start_line,
                start_column,
                end_line,
                end_column,
                document: document_index(document_id)?,
            })
        }
    }

    fn new_hidden(il_offset: u32, document_id: u32) -> Result<Self, FormatError> {
        Ok(Self {
            il_offset,
            start_line: HIDDEN_LINE,
            start_column: 0,
            end_line: HIDDEN_LINE,
            end_column: 0,
            document: document_index(document_id)?,
        })
    }

    fn parse(
        data: &[u8],
        prev: Option<SequencePoint>,
        prev_non_hidden: Option<SequencePoint>,
        document_id: u32,
    ) -> Result<(Self, &[u8]), FormatError> {
        let (il_offset, data) = match prev {
            Some(prev) => {
                let (delta_il_offset, data) = decode_unsigned(data)?;
                let il_offset = prev
                    .il_offset
                    .checked_add(delta_il_offset)
                    .ok_or(FormatErrorKind::InvalidSequencePoint)?;
                (il_offset, data)
            }
            None => decode_unsigned(data)?,
        };

        let (delta_lines, data) = decode_unsigned(data)?;
        let (delta_cols, data): (i64, &[u8]) = if delta_lines == 0 {
            let (n, data) = decode_unsigned(data)?;
            (n as i64, data)
        } else {
            let (n, data) = decode_signed(data)?;
            (n as i64, data)
        };

        if delta_lines == 0 && delta_cols == 0 {
            return Ok((Self::new_hidden(il_offset, document_id)?, data));
        }

        // The start of the first non-hidden point is stored as is, later ones are signed deltas.
        let (start_line, start_column, data) = match prev_non_hidden {
            Some(prev) => {
                let (delta_start_line, data) = decode_signed(data)?;
                let (delta_start_col, data) = decode_signed(data)?;
                (
                    prev.start_line as i64 + delta_start_line as i64,
                    prev.start_column as i64 + delta_start_col as i64,
                    data,
                )
            }
            None => {
                let (start_line, data) = decode_unsigned(data)?;
                let (start_column, data) = decode_unsigned(data)?;
                (start_line as i64, start_column as i64, data)
            }
        };

        let end_line = start_line + delta_lines as i64;
        let end_column = start_column + delta_cols;

        let to_u32 = |n: i64| u32::try_from(n).map_err(|_| FormatErrorKind::InvalidSequencePoint);
        Ok((
            Self::new(
                il_offset,
                to_u32(start_line)?,
                to_u32(start_column)?,
                to_u32(end_line)?,
                to_u32(end_column)?,
                document_id,
            )?,
            data,
        ))
    }
}

/// Converts a 1-based `Document` row into a 0-based index.
fn document_index(document_id: u32) -> Result<usize, FormatError> {
    document_id
        .checked_sub(1)
        .map(|idx| idx as usize)
        .ok_or_else(|| FormatErrorKind::InvalidSequencePoint.into())
}

impl fmt::Debug for SequencePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_hidden() {
            f.debug_struct("HiddenSequencePoint")
                .field("il_offset", &self.il_offset)
                .field("document", &self.document)
                .finish()
        } else {
            f.debug_struct("SequencePoint")
                .field("il_offset", &self.il_offset)
                .field("start_line", &self.start_line)
                .field("start_column", &self.start_column)
                .field("end_line", &self.end_line)
                .field("end_column", &self.end_column)
                .field("document", &self.document)
                .finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sequence_points() {
        let blob = [
            0x01, // local signature
            // IL 0, lines 0, cols 5, start 10:9
            0x00, 0x00, 0x05, 0x0a, 0x09, //
            // hidden point at IL 3
            0x03, 0x00, 0x00, //
            // IL 7, lines 2, cols -1 (signed), start line -2, start col +4
            0x04, 0x02, 0x7f, 0x7d, 0x08, //
            // switch to document 2
            0x00, 0x02, //
            // IL 8, lines 0, cols 1, start line +1, start col 0
            0x01, 0x00, 0x01, 0x02, 0x00,
        ];
        let record = parse_sequence_points(&blob, 1).unwrap();
        assert_eq!(record.local_signature, 1);

        let points = record.sequence_points;
        assert_eq!(points.len(), 4);

        assert_eq!(points[0].il_offset, 0);
        assert_eq!(points[0].start_line, 10);
        assert_eq!(points[0].start_column, 9);
        assert_eq!(points[0].end_line, 10);
        assert_eq!(points[0].end_column, 14);
        assert_eq!(points[0].document, 0);

        assert!(points[1].is_hidden());
        assert_eq!(points[1].il_offset, 3);

        assert_eq!(points[2].il_offset, 7);
        assert_eq!(points[2].start_line, 8);
        assert_eq!(points[2].start_column, 13);
        assert_eq!(points[2].end_line, 10);
        assert_eq!(points[2].end_column, 12);

        assert_eq!(points[3].il_offset, 8);
        assert_eq!(points[3].start_line, 9);
        assert_eq!(points[3].start_column, 13);
        assert_eq!(points[3].end_column, 14);
        assert_eq!(points[3].document, 1);
    }

    #[test]
    fn test_initial_document() {
        // local signature 0, initial document 3, one point
        let blob = [0x00, 0x03, 0x02, 0x00, 0x01, 0x01, 0x01];
        let record = parse_sequence_points(&blob, 0).unwrap();
        assert_eq!(record.sequence_points.len(), 1);
        assert_eq!(record.sequence_points[0].document, 2);
        assert_eq!(record.sequence_points[0].il_offset, 2);
    }

    #[test]
    fn test_invalid_sequence_point() {
        // the second point starts before line 1
        let blob = [0x00, 0x00, 0x00, 0x01, 0x01, 0x01, 0x01, 0x00, 0x01, 0x59, 0x00];
        assert!(parse_sequence_points(&blob, 1).is_err());
        // truncated record
        let blob = [0x00, 0x00, 0x01];
        assert!(parse_sequence_points(&blob, 1).is_err());
    }
}
