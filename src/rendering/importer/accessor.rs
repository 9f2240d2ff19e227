use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use glam::{Mat4, Vec2, Vec3, Vec4};
use gltfstream_files::gltf::types::{Accessor, AccessorType, BufferView, ComponentType, Document};

use crate::error::{AssetKind, ImportError, check_range};
use crate::rendering::asset_graph::cache_data::BufferCacheData;

/// A typed, strided view over a loaded buffer. Does not own anything but a reference to the buffer.
#[derive(Debug, Clone)]
pub struct AttributeAccessor {
    pub accessor_id: usize,
    /// None for accessors without a buffer view, which read as zeros.
    pub buffer: Option<Arc<BufferCacheData>>,
    component_type: ComponentType,
    accessor_type: AccessorType,
    normalized: bool,
    count: usize,
    element_size: usize,
    /// Relative to the start of the buffer window.
    offset: usize,
    stride: usize,
    sparse: Option<Arc<SparseSubstitution>>,
}

/// The substituted elements of a sparse accessor, copied out of their buffers.
#[derive(Debug)]
struct SparseSubstitution {
    /// Strictly increasing element indices.
    indices: Vec<usize>,
    /// `indices.len()` tightly packed elements.
    values: Vec<u8>,
}

fn overflow(accessor_id: usize) -> ImportError {
    ImportError::malformed(format!("accessor {} addresses more bytes than fit in memory", accessor_id))
}

/// Start of a `span` byte read at `byte_offset` into `view`, checked against the view and the loaded buffer.
fn view_window(
    accessor_id: usize,
    view_id: usize,
    view: &BufferView,
    byte_offset: usize,
    span: usize,
    buffer: &BufferCacheData,
) -> Result<usize, ImportError> {
    let end = byte_offset.checked_add(span).ok_or_else(|| overflow(accessor_id))?;
    if end > view.byte_length {
        return Err(ImportError::malformed(format!(
            "accessor {} reads past the end of buffer view {}",
            accessor_id, view_id
        )));
    }

    let offset = view.byte_offset.checked_add(byte_offset).ok_or_else(|| overflow(accessor_id))?;
    match offset.checked_add(span) {
        Some(end) if end <= buffer.byte_length => Ok(offset),
        _ => Err(ImportError::malformed(format!(
            "buffer view {} reads past the end of buffer {}",
            view_id, view.buffer
        ))),
    }
}

impl AttributeAccessor {
    /// Validates the accessor against its buffer view and the loaded buffer. `buffer` must belong to the
    /// accessor's buffer view. Sparse substitution is added with [`AttributeAccessor::with_sparse`].
    pub fn new(
        document: &Document,
        accessor_id: usize,
        buffer: Option<Arc<BufferCacheData>>,
    ) -> Result<Self, ImportError> {
        let accessor = AttributeAccessor::definition(document, accessor_id)?;
        let element_size = accessor.component_type.size() * accessor.accessor_type.components();
        // also bounds the zeros an accessor without a buffer view stands for
        accessor
            .count
            .checked_mul(element_size)
            .ok_or_else(|| overflow(accessor_id))?;

        let (offset, stride) = match (accessor.buffer_view, &buffer) {
            (Some(view_id), Some(buffer)) => {
                let view = &document.buffer_views[check_range(AssetKind::BufferView, view_id, document.buffer_views.len())?];
                let stride = view.byte_stride.unwrap_or(element_size);
                if stride < element_size {
                    return Err(ImportError::malformed(format!(
                        "accessor {} has a stride of {} for elements of {} bytes",
                        accessor_id, stride, element_size
                    )));
                }

                let span = match accessor.count {
                    0 => 0,
                    count => stride
                        .checked_mul(count - 1)
                        .and_then(|span| span.checked_add(element_size))
                        .ok_or_else(|| overflow(accessor_id))?,
                };
                let offset = view_window(accessor_id, view_id, view, accessor.byte_offset, span, buffer)?;
                (offset, stride)
            }
            (Some(_), None) => {
                return Err(ImportError::malformed(format!(
                    "accessor {} has a buffer view, but no buffer has been loaded for it",
                    accessor_id
                )));
            }
            (None, _) => (0, element_size),
        };

        Ok(Self {
            accessor_id,
            buffer: accessor.buffer_view.and(buffer),
            component_type: accessor.component_type,
            accessor_type: accessor.accessor_type,
            normalized: accessor.normalized,
            count: accessor.count,
            element_size,
            offset,
            stride,
            sparse: None,
        })
    }

    pub fn definition(document: &Document, accessor_id: usize) -> Result<&Accessor, ImportError> {
        Ok(&document.accessors[check_range(AssetKind::Accessor, accessor_id, document.accessors.len())?])
    }

    /// The buffer an accessor reads from, None if it has no buffer view.
    pub fn buffer_index(document: &Document, accessor_id: usize) -> Result<Option<usize>, ImportError> {
        let accessor = AttributeAccessor::definition(document, accessor_id)?;
        accessor
            .buffer_view
            .map(|view_id| AttributeAccessor::view_buffer(document, view_id))
            .transpose()
    }

    /// The buffers holding the sparse indices and values, None for dense accessors.
    pub fn sparse_buffer_indices(document: &Document, accessor_id: usize) -> Result<Option<(usize, usize)>, ImportError> {
        let accessor = AttributeAccessor::definition(document, accessor_id)?;
        let Some(sparse) = &accessor.sparse else {
            return Ok(None);
        };
        Ok(Some((
            AttributeAccessor::view_buffer(document, sparse.indices.buffer_view)?,
            AttributeAccessor::view_buffer(document, sparse.values.buffer_view)?,
        )))
    }

    fn view_buffer(document: &Document, view_id: usize) -> Result<usize, ImportError> {
        check_range(AssetKind::BufferView, view_id, document.buffer_views.len())
            .map(|view_id| document.buffer_views[view_id].buffer)
    }

    /// Reads the sparse substitution of the accessor from the buffers [`AttributeAccessor::sparse_buffer_indices`]
    /// named. A dense accessor is returned unchanged.
    pub fn with_sparse(
        mut self,
        document: &Document,
        indices_buffer: &BufferCacheData,
        values_buffer: &BufferCacheData,
    ) -> Result<Self, ImportError> {
        let accessor_id = self.accessor_id;
        let Some(sparse) = &AttributeAccessor::definition(document, accessor_id)?.sparse else {
            return Ok(self);
        };
        if sparse.count > self.count {
            return Err(ImportError::malformed(format!(
                "accessor {} substitutes {} of its {} elements",
                accessor_id, sparse.count, self.count
            )));
        }

        let index_size = match sparse.indices.component_type {
            ComponentType::UnsignedByte | ComponentType::UnsignedShort | ComponentType::UnsignedInt => {
                sparse.indices.component_type.size()
            }
            other => {
                return Err(ImportError::malformed(format!(
                    "accessor {} has sparse indices of type {:?}",
                    accessor_id, other
                )));
            }
        };

        let view_id = sparse.indices.buffer_view;
        let view = &document.buffer_views[check_range(AssetKind::BufferView, view_id, document.buffer_views.len())?];
        let span = sparse.count.checked_mul(index_size).ok_or_else(|| overflow(accessor_id))?;
        let start = view_window(accessor_id, view_id, view, sparse.indices.byte_offset, span, indices_buffer)?;

        let mut indices = Vec::with_capacity(sparse.count);
        for raw in indices_buffer.bytes()[start..start + span].chunks_exact(index_size) {
            let index = match index_size {
                1 => raw[0] as usize,
                2 => LittleEndian::read_u16(raw) as usize,
                _ => LittleEndian::read_u32(raw) as usize,
            };
            if index >= self.count || indices.last().is_some_and(|&last| last >= index) {
                return Err(ImportError::malformed(format!(
                    "accessor {} has sparse index {} out of order or beyond its {} elements",
                    accessor_id, index, self.count
                )));
            }
            indices.push(index);
        }

        let view_id = sparse.values.buffer_view;
        let view = &document.buffer_views[check_range(AssetKind::BufferView, view_id, document.buffer_views.len())?];
        let span = sparse
            .count
            .checked_mul(self.element_size)
            .ok_or_else(|| overflow(accessor_id))?;
        let start = view_window(accessor_id, view_id, view, sparse.values.byte_offset, span, values_buffer)?;
        let values = values_buffer.bytes()[start..start + span].to_vec();

        self.sparse = Some(Arc::new(SparseSubstitution { indices, values }));
        Ok(self)
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn accessor_type(&self) -> AccessorType {
        self.accessor_type
    }

    fn expect_type(&self, expected: &[AccessorType]) -> Result<(), ImportError> {
        if expected.contains(&self.accessor_type) {
            Ok(())
        } else {
            Err(ImportError::malformed(format!(
                "accessor {} is {:?}, expected one of {:?}",
                self.accessor_id, self.accessor_type, expected
            )))
        }
    }

    /// The raw bytes of element `index`, None where it reads as zeros.
    fn element_bytes<'b>(&'b self, base: Option<&'b [u8]>, index: usize) -> Option<&'b [u8]> {
        if let Some(sparse) = &self.sparse
            && let Ok(at) = sparse.indices.binary_search(&index)
        {
            return Some(&sparse.values[at * self.element_size..(at + 1) * self.element_size]);
        }
        let start = self.offset + index * self.stride;
        base.map(|bytes| &bytes[start..start + self.element_size])
    }

    fn read_component(&self, bytes: &[u8]) -> f32 {
        let normalized = self.normalized;
        match self.component_type {
            ComponentType::Float => LittleEndian::read_f32(bytes),
            ComponentType::Byte if normalized => (bytes[0] as i8 as f32 / 127.0).max(-1.0),
            ComponentType::Byte => bytes[0] as i8 as f32,
            ComponentType::UnsignedByte if normalized => bytes[0] as f32 / 255.0,
            ComponentType::UnsignedByte => bytes[0] as f32,
            ComponentType::Short if normalized => (LittleEndian::read_i16(bytes) as f32 / 32767.0).max(-1.0),
            ComponentType::Short => LittleEndian::read_i16(bytes) as f32,
            ComponentType::UnsignedShort if normalized => LittleEndian::read_u16(bytes) as f32 / 65535.0,
            ComponentType::UnsignedShort => LittleEndian::read_u16(bytes) as f32,
            ComponentType::UnsignedInt => LittleEndian::read_u32(bytes) as f32,
        }
    }

    /// Applies `f` to the components of every element, in order.
    fn read_elements<T>(&self, mut f: impl FnMut(&[f32]) -> T) -> Vec<T> {
        let component_size = self.component_type.size();
        let mut element = vec![0.0f32; self.accessor_type.components()];
        let base = self.buffer.as_ref().map(|buffer| buffer.bytes());

        (0..self.count)
            .map(|i| {
                match self.element_bytes(base, i) {
                    Some(raw) => {
                        for (value, bytes) in element.iter_mut().zip(raw.chunks_exact(component_size)) {
                            *value = self.read_component(bytes);
                        }
                    }
                    None => element.fill(0.0),
                }
                f(&element)
            })
            .collect()
    }

    pub fn to_floats(&self) -> Result<Vec<f32>, ImportError> {
        self.expect_type(&[AccessorType::Scalar])?;
        Ok(self.read_elements(|e| e[0]))
    }

    pub fn to_vec2s(&self) -> Result<Vec<Vec2>, ImportError> {
        self.expect_type(&[AccessorType::Vec2])?;
        Ok(self.read_elements(|e| Vec2::new(e[0], e[1])))
    }

    pub fn to_vec3s(&self) -> Result<Vec<Vec3>, ImportError> {
        self.expect_type(&[AccessorType::Vec3])?;
        Ok(self.read_elements(|e| Vec3::new(e[0], e[1], e[2])))
    }

    pub fn to_vec4s(&self) -> Result<Vec<Vec4>, ImportError> {
        self.expect_type(&[AccessorType::Vec4])?;
        Ok(self.read_elements(|e| Vec4::new(e[0], e[1], e[2], e[3])))
    }

    /// Vertex colors may be RGB or RGBA, RGB is widened with an opaque alpha.
    pub fn to_colors(&self) -> Result<Vec<Vec4>, ImportError> {
        self.expect_type(&[AccessorType::Vec3, AccessorType::Vec4])?;
        Ok(self.read_elements(|e| Vec4::new(e[0], e[1], e[2], e.get(3).copied().unwrap_or(1.0))))
    }

    pub fn to_mat4s(&self) -> Result<Vec<Mat4>, ImportError> {
        self.expect_type(&[AccessorType::Mat4])?;
        Ok(self.read_elements(Mat4::from_cols_slice))
    }

    pub fn to_joints(&self) -> Result<Vec<[u16; 4]>, ImportError> {
        self.expect_type(&[AccessorType::Vec4])?;
        Ok(self.read_elements(|e| [e[0] as u16, e[1] as u16, e[2] as u16, e[3] as u16]))
    }

    pub fn to_indices(&self) -> Result<Vec<u32>, ImportError> {
        self.expect_type(&[AccessorType::Scalar])?;
        if self.component_type == ComponentType::Float {
            return Err(ImportError::malformed(format!(
                "accessor {} stores indices as floats",
                self.accessor_id
            )));
        }

        // read the raw integers, an f32 would lose precision above 2^24
        let base = self.buffer.as_ref().map(|buffer| buffer.bytes());
        Ok((0..self.count)
            .map(|i| match self.element_bytes(base, i) {
                Some(raw) => match self.component_type {
                    ComponentType::UnsignedInt => LittleEndian::read_u32(raw),
                    ComponentType::UnsignedShort | ComponentType::Short => LittleEndian::read_u16(raw) as u32,
                    _ => raw[0] as u32,
                },
                None => 0,
            })
            .collect())
    }
}
