//! Door descriptors connecting areas

use crate::game::area::AreaId;
use crate::game::geometry::Rectangle;

/// Door identifier
pub type DoorId = u32;

/// A trigger region in one area that relocates players into another area.
///
/// Both the trigger and the destination are in area-local pixels of their
/// respective areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Door {
    pub id: DoorId,
    pub source_area: AreaId,
    pub destination_area: AreaId,
    pub destination_x: i32,
    pub destination_y: i32,
    pub trigger: Rectangle,
}

impl Door {
    pub fn new(
        id: DoorId,
        source_area: AreaId,
        trigger: Rectangle,
        destination_area: AreaId,
        destination_x: i32,
        destination_y: i32,
    ) -> Self {
        Self {
            id,
            source_area,
            destination_area,
            destination_x,
            destination_y,
            trigger,
        }
    }

    /// Check if a footprint touches this door's trigger
    pub fn is_triggered_by(&self, footprint: &Rectangle) -> bool {
        self.trigger.overlaps(footprint)
    }

    /// Whether the door leads back into its own area
    pub fn is_local(&self) -> bool {
        self.source_area == self.destination_area
    }
}
