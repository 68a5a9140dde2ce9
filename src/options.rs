use bitflags::bitflags;

// Values match the GV_* constants of the GRASS vector library.
bitflags! {
    /// Native geometry type bit-flags.
    ///
    /// These are only used where a type *mask* is needed (selection queries,
    /// category-index filtering). Single objects carry a
    /// [`LineType`](crate::native::LineType) instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GeometryType: u32 {
        const POINT = 0x01;
        const LINE = 0x02;
        const BOUNDARY = 0x04;
        const CENTROID = 0x08;
        const FACE = 0x10;
        const KERNEL = 0x20;
        const AREA = 0x40;
        const VOLUME = 0x80;

        /// Point-like primitives.
        const POINTS = Self::POINT.bits() | Self::CENTROID.bits();
        /// Line-like primitives.
        const LINES = Self::LINE.bits() | Self::BOUNDARY.bits();
    }
}

impl Default for GeometryType {
    fn default() -> GeometryType {
        GeometryType::empty()
    }
}

bitflags! {
    /// Open mode of a native vector map.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        /// Open in read-only mode (default).
        const READ_ONLY = 0x00;
        /// Open in update mode.
        const UPDATE = 0x01;
    }
}

impl Default for OpenFlags {
    fn default() -> OpenFlags {
        OpenFlags::READ_ONLY
    }
}

bitflags! {
    /// Flags of a [`FeatureRequest`](crate::vector::FeatureRequest).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RequestFlags: u32 {
        /// Do not build geometries.
        const NO_GEOMETRY = 0x01;
        /// Only fetch the attributes listed in the request.
        const SUBSET_OF_ATTRIBUTES = 0x02;
        /// Test the filter rectangle against the real geometry instead of bounding boxes.
        const EXACT_INTERSECT = 0x04;
    }
}
