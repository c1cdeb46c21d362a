// VTK XML reader: .vtu pieces and .pvtu piece manifests.
// Covers the subset simulation codes emit: UnstructuredGrid/PolyData points and
// point data, ascii / inline base64 / appended arrays, optional zlib blocks.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use flate2::read::ZlibDecoder;
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::VtuError;

const APPENDED_OPEN: &[u8] = b"<AppendedData";
const APPENDED_CLOSE: &[u8] = b"</AppendedData>";

/// Points and per-point arrays of one file (all of its `Piece`s concatenated).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PieceData {
    pub points: Vec<[f64; 3]>,
    pub fields: BTreeMap<String, Vec<f64>>,
}

impl PieceData {
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Concatenate `other` after `self`, key by key.
    pub fn append(&mut self, other: PieceData) {
        self.points.extend(other.points);
        for (key, values) in other.fields {
            self.fields.entry(key).or_default().extend(values);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
}

fn bytes_of<const N: usize>(chunk: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(chunk);
    out
}

macro_rules! decode_num {
    ($t:ty, $chunk:expr, $big:expr) => {
        if $big {
            <$t>::from_be_bytes(bytes_of($chunk)) as f64
        } else {
            <$t>::from_le_bytes(bytes_of($chunk)) as f64
        }
    };
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "Int8" => ScalarType::Int8,
            "UInt8" => ScalarType::UInt8,
            "Int16" => ScalarType::Int16,
            "UInt16" => ScalarType::UInt16,
            "Int32" => ScalarType::Int32,
            "UInt32" => ScalarType::UInt32,
            "Int64" => ScalarType::Int64,
            "UInt64" => ScalarType::UInt64,
            "Float32" => ScalarType::Float32,
            "Float64" => ScalarType::Float64,
            _ => return None,
        })
    }

    fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float32 => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Float64 => 8,
        }
    }

    fn decode(self, chunk: &[u8], big_endian: bool) -> f64 {
        match self {
            ScalarType::Int8 => decode_num!(i8, chunk, big_endian),
            ScalarType::UInt8 => decode_num!(u8, chunk, big_endian),
            ScalarType::Int16 => decode_num!(i16, chunk, big_endian),
            ScalarType::UInt16 => decode_num!(u16, chunk, big_endian),
            ScalarType::Int32 => decode_num!(i32, chunk, big_endian),
            ScalarType::UInt32 => decode_num!(u32, chunk, big_endian),
            ScalarType::Int64 => decode_num!(i64, chunk, big_endian),
            ScalarType::UInt64 => decode_num!(u64, chunk, big_endian),
            ScalarType::Float32 => decode_num!(f32, chunk, big_endian),
            ScalarType::Float64 => decode_num!(f64, chunk, big_endian),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum AppendedEncoding {
    Raw,
    Base64,
}

struct Appended {
    encoding: AppendedEncoding,
    data: Vec<u8>,
}

/// File-level decoding context taken from the `VTKFile` root attributes.
struct Context<'a> {
    path: &'a Path,
    big_endian: bool,
    header_size: usize,
    zlib: bool,
    appended: Option<Appended>,
}

impl Context<'_> {
    fn format(&self, message: impl Into<String>) -> VtuError {
        VtuError::Format {
            path: self.path.to_path_buf(),
            message: message.into(),
        }
    }

    fn read_header_uint(&self, bytes: &[u8]) -> Result<usize, VtuError> {
        if bytes.len() < self.header_size {
            return Err(self.format("truncated binary array header"));
        }
        let chunk = &bytes[..self.header_size];
        let value = match (self.header_size, self.big_endian) {
            (4, false) => u32::from_le_bytes(bytes_of(chunk)) as u64,
            (4, true) => u32::from_be_bytes(bytes_of(chunk)) as u64,
            (_, false) => u64::from_le_bytes(bytes_of(chunk)),
            (_, true) => u64::from_be_bytes(bytes_of(chunk)),
        };
        usize::try_from(value).map_err(|_| self.format("binary array header overflows usize"))
    }

    /// A length read from the file does not fit in memory arithmetic.
    fn overflow(&self) -> VtuError {
        self.format("binary array header overflows")
    }

    fn base64(&self, chars: &[u8]) -> Result<Vec<u8>, VtuError> {
        STANDARD
            .decode(chars)
            .map_err(|e| self.format(format!("invalid base64 data: {e}")))
    }
}

/// Number of base64 characters encoding `bytes` bytes (with padding).
fn b64_len(bytes: usize) -> Option<usize> {
    bytes.div_ceil(3).checked_mul(4)
}

/// Read every `Piece` of a `.vtu` (or `.vtp`) file and concatenate them.
pub fn read_vtu(path: &Path) -> Result<PieceData, VtuError> {
    let bytes = fs::read(path).map_err(|source| VtuError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let (xml, appended) = split_appended(&bytes, path)?;
    let doc = roxmltree::Document::parse(&xml).map_err(|e| VtuError::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let root = doc.root_element();
    if !root.has_tag_name("VTKFile") {
        return Err(VtuError::Format {
            path: path.to_path_buf(),
            message: format!("root element is <{}>, expected <VTKFile>", root.tag_name().name()),
        });
    }

    let dataset_type = root.attribute("type").unwrap_or("");
    if dataset_type != "UnstructuredGrid" && dataset_type != "PolyData" {
        return Err(VtuError::Unsupported {
            path: path.to_path_buf(),
            what: "dataset type",
            value: dataset_type.to_string(),
        });
    }

    let big_endian = match root.attribute("byte_order").unwrap_or("LittleEndian") {
        "LittleEndian" => false,
        "BigEndian" => true,
        other => {
            return Err(VtuError::Unsupported {
                path: path.to_path_buf(),
                what: "byte order",
                value: other.to_string(),
            });
        }
    };
    let header_size = match root.attribute("header_type").unwrap_or("UInt32") {
        "UInt32" => 4,
        "UInt64" => 8,
        other => {
            return Err(VtuError::Unsupported {
                path: path.to_path_buf(),
                what: "header type",
                value: other.to_string(),
            });
        }
    };
    let zlib = match root.attribute("compressor").unwrap_or("") {
        "" => false,
        "vtkZLibDataCompressor" => true,
        other => {
            return Err(VtuError::Unsupported {
                path: path.to_path_buf(),
                what: "compressor",
                value: other.to_string(),
            });
        }
    };

    let ctx = Context {
        path,
        big_endian,
        header_size,
        zlib,
        appended,
    };

    let dataset = root
        .children()
        .find(|n| n.has_tag_name(dataset_type))
        .ok_or_else(|| ctx.format(format!("missing <{dataset_type}> element")))?;

    let mut out = PieceData::default();
    let mut pieces = 0usize;
    for piece in dataset.children().filter(|n| n.has_tag_name("Piece")) {
        out.append(read_piece(piece, &ctx)?);
        pieces += 1;
    }
    if pieces == 0 {
        return Err(ctx.format("no <Piece> elements"));
    }
    Ok(out)
}

/// Piece file paths referenced by a `.pvtu` manifest, in document order,
/// resolved against the manifest's directory.
pub fn read_manifest(path: &Path) -> Result<Vec<PathBuf>, VtuError> {
    let text = fs::read_to_string(path).map_err(|source| VtuError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let doc = roxmltree::Document::parse(&text).map_err(|e| VtuError::Xml {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let dir = path.parent().unwrap_or_else(|| Path::new(""));
    let sources: Vec<PathBuf> = doc
        .descendants()
        .filter(|n| n.has_tag_name("Piece"))
        .filter_map(|n| n.attribute("Source"))
        .map(|src| dir.join(src))
        .collect();
    if sources.is_empty() {
        return Err(VtuError::Format {
            path: path.to_path_buf(),
            message: "manifest references no piece sources".to_string(),
        });
    }
    Ok(sources)
}

/// Separate a raw `<AppendedData>` block from the XML text so the remainder
/// can be parsed as UTF-8.
fn split_appended(bytes: &[u8], path: &Path) -> Result<(String, Option<Appended>), VtuError> {
    let format_err = |message: &str| VtuError::Format {
        path: path.to_path_buf(),
        message: message.to_string(),
    };
    let utf8 = |slice: &[u8]| {
        String::from_utf8(slice.to_vec()).map_err(|_| VtuError::Xml {
            path: path.to_path_buf(),
            message: "file is not valid UTF-8".to_string(),
        })
    };

    let Some(start) = find(bytes, APPENDED_OPEN, 0) else {
        return Ok((utf8(bytes)?, None));
    };
    let tag_end = find(bytes, b">", start).ok_or_else(|| format_err("unterminated <AppendedData> tag"))?;
    let tag = String::from_utf8_lossy(&bytes[start..tag_end]);
    let encoding = match attribute_in_tag(&tag, "encoding").as_deref() {
        Some("raw") | None => AppendedEncoding::Raw,
        Some("base64") => AppendedEncoding::Base64,
        Some(other) => {
            return Err(VtuError::Unsupported {
                path: path.to_path_buf(),
                what: "appended encoding",
                value: other.to_string(),
            });
        }
    };
    let marker = find(bytes, b"_", tag_end).ok_or_else(|| format_err("appended data has no '_' marker"))?;
    let data_end = rfind(bytes, APPENDED_CLOSE).filter(|&e| e > marker).unwrap_or(bytes.len());
    let mut data = bytes[marker + 1..data_end].to_vec();
    if encoding == AppendedEncoding::Base64 {
        data.retain(|b| !b.is_ascii_whitespace());
    }

    let mut xml = utf8(&bytes[..start])?;
    xml.push_str("</VTKFile>");
    Ok((xml, Some(Appended { encoding, data })))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).rposition(|w| w == needle)
}

fn attribute_in_tag(tag: &str, name: &str) -> Option<String> {
    let key = format!("{name}=");
    let at = tag.find(&key)? + key.len();
    let rest = &tag[at..];
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let body = &rest[1..];
    let end = body.find(quote)?;
    Some(body[..end].to_string())
}

fn read_piece(piece: roxmltree::Node, ctx: &Context) -> Result<PieceData, VtuError> {
    let n_points: usize = piece
        .attribute("NumberOfPoints")
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| ctx.format("<Piece> lacks a valid NumberOfPoints"))?;

    let points_array = piece
        .children()
        .find(|n| n.has_tag_name("Points"))
        .and_then(|p| p.children().find(|n| n.has_tag_name("DataArray")))
        .ok_or_else(|| ctx.format("<Piece> has no <Points> array"))?;
    let coords = read_data_array(points_array, ctx)?;
    if coords.components != 3 || coords.values.len() != 3 * n_points {
        return Err(ctx.format(format!(
            "points array has {} components and {} values for {} points",
            coords.components,
            coords.values.len(),
            n_points
        )));
    }
    let points = coords
        .values
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect();

    let mut fields = BTreeMap::new();
    if let Some(point_data) = piece.children().find(|n| n.has_tag_name("PointData")) {
        for node in point_data.children().filter(|n| n.has_tag_name("DataArray")) {
            let array = read_data_array(node, ctx)?;
            if array.values.len() != array.components * n_points {
                return Err(ctx.format(format!(
                    "point array '{}' has {} values, expected {}",
                    array.name,
                    array.values.len(),
                    array.components * n_points
                )));
            }
            if array.components == 1 {
                fields.insert(array.name, array.values);
            } else {
                for c in 0..array.components {
                    let component = array
                        .values
                        .iter()
                        .skip(c)
                        .step_by(array.components)
                        .copied()
                        .collect();
                    fields.insert(format!("{}[{c}]", array.name), component);
                }
            }
        }
    }

    Ok(PieceData { points, fields })
}

struct DataArray {
    name: String,
    components: usize,
    values: Vec<f64>,
}

fn read_data_array(node: roxmltree::Node, ctx: &Context) -> Result<DataArray, VtuError> {
    let name = node.attribute("Name").unwrap_or("").to_string();
    let components = match node.attribute("NumberOfComponents") {
        Some(s) => s
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&c| c > 0)
            .ok_or_else(|| ctx.format(format!("array '{name}' has invalid NumberOfComponents")))?,
        None => 1,
    };
    let type_name = node.attribute("type").unwrap_or("");
    let scalar = ScalarType::parse(type_name).ok_or_else(|| VtuError::Unsupported {
        path: ctx.path.to_path_buf(),
        what: "scalar type",
        value: type_name.to_string(),
    })?;

    let values = match node.attribute("format").unwrap_or("ascii") {
        "ascii" => parse_ascii(node.text().unwrap_or(""), &name, ctx)?,
        "binary" => {
            let chars: Vec<u8> = node
                .text()
                .unwrap_or("")
                .bytes()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            let raw = decode_base64_array(&chars, ctx)?;
            convert(&raw, scalar, ctx)?
        }
        "appended" => {
            let offset: usize = node
                .attribute("offset")
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| ctx.format(format!("appended array '{name}' lacks an offset")))?;
            let appended = ctx
                .appended
                .as_ref()
                .ok_or_else(|| ctx.format("appended array but no <AppendedData> block"))?;
            let tail = appended
                .data
                .get(offset..)
                .ok_or_else(|| ctx.format(format!("offset {offset} of '{name}' is past the appended data")))?;
            let raw = match appended.encoding {
                AppendedEncoding::Raw => decode_raw_array(tail, ctx)?,
                AppendedEncoding::Base64 => decode_base64_array(tail, ctx)?,
            };
            convert(&raw, scalar, ctx)?
        }
        other => {
            return Err(VtuError::Unsupported {
                path: ctx.path.to_path_buf(),
                what: "array format",
                value: other.to_string(),
            });
        }
    };

    Ok(DataArray {
        name,
        components,
        values,
    })
}

fn parse_ascii(text: &str, name: &str, ctx: &Context) -> Result<Vec<f64>, VtuError> {
    text.split_ascii_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .map_err(|_| ctx.format(format!("array '{name}': '{tok}' is not a number")))
        })
        .collect()
}

fn convert(raw: &[u8], scalar: ScalarType, ctx: &Context) -> Result<Vec<f64>, VtuError> {
    let size = scalar.size();
    if raw.len() % size != 0 {
        return Err(ctx.format(format!(
            "binary array of {} bytes is not a multiple of {size}",
            raw.len()
        )));
    }
    Ok(raw
        .chunks_exact(size)
        .map(|chunk| scalar.decode(chunk, ctx.big_endian))
        .collect())
}

/// Compressed-block header: (uncompressed block size, last block size, compressed sizes).
struct BlockHeader {
    block_size: usize,
    last_size: usize,
    compressed: Vec<usize>,
}

impl BlockHeader {
    fn byte_len(ctx: &Context, blocks: usize) -> Result<usize, VtuError> {
        blocks
            .checked_add(3)
            .and_then(|words| words.checked_mul(ctx.header_size))
            .ok_or_else(|| ctx.overflow())
    }

    fn parse(bytes: &[u8], ctx: &Context) -> Result<Self, VtuError> {
        let h = ctx.header_size;
        let blocks = ctx.read_header_uint(bytes)?;
        if bytes.len() < Self::byte_len(ctx, blocks)? {
            return Err(ctx.format("truncated compressed block header"));
        }
        let block_size = ctx.read_header_uint(&bytes[h..])?;
        let last_size = ctx.read_header_uint(&bytes[2 * h..])?;
        let compressed = (0..blocks)
            .map(|i| ctx.read_header_uint(&bytes[(3 + i) * h..]))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            block_size,
            last_size,
            compressed,
        })
    }

    fn total_compressed(&self, ctx: &Context) -> Result<usize, VtuError> {
        self.compressed
            .iter()
            .try_fold(0usize, |acc, &size| acc.checked_add(size))
            .ok_or_else(|| ctx.overflow())
    }

    fn inflate(&self, data: &[u8], ctx: &Context) -> Result<Vec<u8>, VtuError> {
        if data.len() < self.total_compressed(ctx)? {
            return Err(ctx.format("truncated compressed array data"));
        }
        let mut out = Vec::new();
        let mut cursor = 0usize;
        for (i, &size) in self.compressed.iter().enumerate() {
            let mut block = Vec::new();
            let end = cursor.checked_add(size).ok_or_else(|| ctx.overflow())?;
            let compressed = data
                .get(cursor..end)
                .ok_or_else(|| ctx.format("truncated compressed array data"))?;
            ZlibDecoder::new(compressed)
                .read_to_end(&mut block)
                .map_err(|e| ctx.format(format!("zlib block {i} failed to inflate: {e}")))?;
            let expected = if i + 1 == self.compressed.len() && self.last_size != 0 {
                self.last_size
            } else {
                self.block_size
            };
            if block.len() != expected {
                return Err(ctx.format(format!(
                    "zlib block {i} inflated to {} bytes, expected {expected}",
                    block.len()
                )));
            }
            out.extend_from_slice(&block);
            cursor = end;
        }
        Ok(out)
    }
}

/// Decode a raw appended array starting at its offset.
fn decode_raw_array(bytes: &[u8], ctx: &Context) -> Result<Vec<u8>, VtuError> {
    if ctx.zlib {
        let header = BlockHeader::parse(bytes, ctx)?;
        let start = BlockHeader::byte_len(ctx, header.compressed.len())?;
        let body = bytes
            .get(start..)
            .ok_or_else(|| ctx.format("truncated compressed block header"))?;
        header.inflate(body, ctx)
    } else {
        let n = ctx.read_header_uint(bytes)?;
        let end = ctx.header_size.checked_add(n).ok_or_else(|| ctx.overflow())?;
        bytes
            .get(ctx.header_size..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ctx.format("truncated raw appended array"))
    }
}

/// Decode a base64 array (inline `binary` or base64 `appended`).
///
/// Writers encode the header and the payload either as two separate base64
/// streams or as a single one; a padded header chunk identifies the former.
fn decode_base64_array(chars: &[u8], ctx: &Context) -> Result<Vec<u8>, VtuError> {
    let h = ctx.header_size;
    let chars_for = |bytes: usize| b64_len(bytes).ok_or_else(|| ctx.overflow());
    if ctx.zlib {
        // The first three header words are a multiple of 3 bytes, so they
        // decode independently of the rest of the header.
        let prefix = chars
            .get(..chars_for(3 * h)?)
            .ok_or_else(|| ctx.format("truncated compressed array header"))?;
        let blocks = ctx.read_header_uint(&ctx.base64(prefix)?)?;
        let header_chars = chars_for(BlockHeader::byte_len(ctx, blocks)?)?;
        let header_bytes = ctx.base64(
            chars
                .get(..header_chars)
                .ok_or_else(|| ctx.format("truncated compressed array header"))?,
        )?;
        let header = BlockHeader::parse(&header_bytes, ctx)?;
        let body_end = header_chars
            .checked_add(chars_for(header.total_compressed(ctx)?)?)
            .ok_or_else(|| ctx.overflow())?;
        let body = chars
            .get(header_chars..body_end)
            .ok_or_else(|| ctx.format("truncated compressed array data"))?;
        return header.inflate(&ctx.base64(body)?, ctx);
    }

    let header_chars = chars_for(h)?;
    let head = chars
        .get(..header_chars)
        .ok_or_else(|| ctx.format("truncated binary array header"))?;
    if head.contains(&b'=') {
        let n = ctx.read_header_uint(&ctx.base64(head)?)?;
        let body_end = header_chars
            .checked_add(chars_for(n)?)
            .ok_or_else(|| ctx.overflow())?;
        let body = chars
            .get(header_chars..body_end)
            .ok_or_else(|| ctx.format("truncated binary array data"))?;
        let mut data = ctx.base64(body)?;
        data.truncate(n);
        Ok(data)
    } else {
        let n = ctx.read_header_uint(&ctx.base64(head)?)?;
        let end = h.checked_add(n).ok_or_else(|| ctx.overflow())?;
        let total = chars_for(end)?.min(chars.len());
        let all = ctx.base64(&chars[..total])?;
        all.get(h..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| ctx.format("truncated binary array data"))
    }
}
