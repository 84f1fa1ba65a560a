//! Device class constants and listener class-filter masks.
//!
//! Every registered service carries a small-integer device class. Status
//! listeners subscribe with a [`DeviceClassMask`] selecting which classes
//! they want notified about.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Small-integer category of a registered device service.
///
/// Must be strictly below [`DeviceClass::MAX`]; `AddService`/`UpdateService`
/// reject anything else with `InvalidParam`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceClass(pub u16);

impl DeviceClass {
    /// Default class for services without a dedicated category.
    pub const DEFAULT: DeviceClass = DeviceClass(0);
    /// Platform devices (buses, controllers).
    pub const PLAT: DeviceClass = DeviceClass(1);
    /// Sensor devices.
    pub const SENSOR: DeviceClass = DeviceClass(2);
    /// Input devices (keys, touch).
    pub const INPUT: DeviceClass = DeviceClass(3);
    /// Display devices.
    pub const DISPLAY: DeviceClass = DeviceClass(4);
    /// Audio devices.
    pub const AUDIO: DeviceClass = DeviceClass(5);
    /// Camera devices.
    pub const CAMERA: DeviceClass = DeviceClass(6);
    /// USB devices.
    pub const USB: DeviceClass = DeviceClass(7);
    /// User authentication devices.
    pub const USERAUTH: DeviceClass = DeviceClass(8);

    /// Exclusive upper bound for valid device classes.
    pub const MAX: u16 = 9;

    /// Whether this class is within the valid range.
    pub fn is_valid(self) -> bool {
        self.0 < Self::MAX
    }

    /// The filter bit corresponding to this class.
    ///
    /// Returns an empty mask for an out-of-range class, which matches no
    /// listener filter.
    pub fn mask(self) -> DeviceClassMask {
        if self.is_valid() {
            DeviceClassMask::from_bits_truncate(1 << self.0)
        } else {
            DeviceClassMask::empty()
        }
    }
}

bitflags! {
    /// Bitmask of device classes a status listener subscribes to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceClassMask: u32 {
        /// [`DeviceClass::DEFAULT`]
        const DEFAULT = 1 << 0;
        /// [`DeviceClass::PLAT`]
        const PLAT = 1 << 1;
        /// [`DeviceClass::SENSOR`]
        const SENSOR = 1 << 2;
        /// [`DeviceClass::INPUT`]
        const INPUT = 1 << 3;
        /// [`DeviceClass::DISPLAY`]
        const DISPLAY = 1 << 4;
        /// [`DeviceClass::AUDIO`]
        const AUDIO = 1 << 5;
        /// [`DeviceClass::CAMERA`]
        const CAMERA = 1 << 6;
        /// [`DeviceClass::USB`]
        const USB = 1 << 7;
        /// [`DeviceClass::USERAUTH`]
        const USERAUTH = 1 << 8;
    }
}

impl DeviceClassMask {
    /// Whether a service of class `class` matches this filter.
    pub fn matches(self, class: DeviceClass) -> bool {
        self.intersects(class.mask())
    }
}
