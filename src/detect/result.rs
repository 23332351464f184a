use serde::{Deserialize, Serialize};

use crate::frame::BoundingBox;

/// COCO class index of "person", the only class the segmenter tracks.
pub const COCO_PERSON: u16 = 0;

/// A single detector output in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    #[serde(rename = "class_id", with = "class_id", default = "default_class")]
    pub class: ObjectClass,
    pub confidence: f32,
}

impl Detection {
    pub fn person(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            class: ObjectClass::Person,
            confidence,
        }
    }
}

fn default_class() -> ObjectClass {
    ObjectClass::Person
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectClass {
    Person,
    /// Any other COCO class, kept by index.
    Other(u16),
}

impl ObjectClass {
    pub fn from_coco_id(id: u16) -> Self {
        if id == COCO_PERSON {
            ObjectClass::Person
        } else {
            ObjectClass::Other(id)
        }
    }

    pub fn coco_id(&self) -> u16 {
        match self {
            ObjectClass::Person => COCO_PERSON,
            ObjectClass::Other(id) => *id,
        }
    }
}

mod class_id {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ObjectClass;

    pub fn serialize<S: Serializer>(class: &ObjectClass, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u16(class.coco_id())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<ObjectClass, D::Error> {
        Ok(ObjectClass::from_coco_id(u16::deserialize(d)?))
    }
}
