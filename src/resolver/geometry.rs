//! Typed array readers for structure decoders
//!
//! Vertex arrays are stored as `f32` triplets in the engine's X, Z, Y order
//! (Z up); they come back here as `Vector3 { x, y, z }`. Triangles are three
//! `i16` vertex indices, UVs two `f32`.

use super::pointer::ResolvedPointer;
use crate::Result;

/// Point or normal in the engine's coordinate space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    /// X (right)
    pub x: f32,
    /// Y (forward)
    pub y: f32,
    /// Z (up)
    pub z: f32,
}

/// Texture coordinate
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    /// U
    pub u: f32,
    /// V
    pub v: f32,
}

/// Triangle as three vertex indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Triangle {
    /// First vertex
    pub v0: i16,
    /// Second vertex
    pub v1: i16,
    /// Third vertex
    pub v2: i16,
}

/// Read `count` vertices starting at `ptr`
pub fn read_vertices(ptr: &ResolvedPointer<'_>, count: usize) -> Result<Vec<Vector3>> {
    let mut cursor = ptr.cursor();
    (0..count)
        .map(|_| {
            let x = cursor.read_f32()?;
            let z = cursor.read_f32()?;
            let y = cursor.read_f32()?;
            Ok(Vector3 { x, y, z })
        })
        .collect()
}

/// Read `count` triangles starting at `ptr`
pub fn read_triangles(ptr: &ResolvedPointer<'_>, count: usize) -> Result<Vec<Triangle>> {
    let mut cursor = ptr.cursor();
    (0..count)
        .map(|_| {
            Ok(Triangle {
                v0: cursor.read_i16()?,
                v1: cursor.read_i16()?,
                v2: cursor.read_i16()?,
            })
        })
        .collect()
}

/// Read `count` texture coordinates starting at `ptr`
pub fn read_uvs(ptr: &ResolvedPointer<'_>, count: usize) -> Result<Vec<Vector2>> {
    let mut cursor = ptr.cursor();
    (0..count)
        .map(|_| {
            Ok(Vector2 {
                u: cursor.read_f32()?,
                v: cursor.read_f32()?,
            })
        })
        .collect()
}
