//! ISO 11783 NAME (64 bits): identity and arbitration key of a node.
//!
//! A numerically smaller NAME wins a contested address. The field travels
//! little-endian as the 8-byte payload of PGN 60928 and inside commanded
//! address messages.
//!
//! # Bit layout
//!
//! ```text
//! Bits  0-20  (21 bits) : Unique number
//! Bits 21-31  (11 bits) : Manufacturer code
//! Bits 32-34  ( 3 bits) : Device instance (lower part)
//! Bits 35-39  ( 5 bits) : Device instance (upper part)
//! Bits 40-47  ( 8 bits) : Device function
//! Bit  48     ( 1 bit ) : Reserved
//! Bits 49-55  ( 7 bits) : Device class
//! Bits 56-59  ( 4 bits) : System instance
//! Bits 60-62  ( 3 bits) : Industry group
//! Bit  63     ( 1 bit ) : Arbitrary address capable
//! ```
use core::fmt;

const UNIQUE_NUMBER_MASK: u64 = 0x1F_FFFF;
const MANUFACTURER_SHIFT: u32 = 21;
const INSTANCE_LOWER_SHIFT: u32 = 32;
const INSTANCE_UPPER_SHIFT: u32 = 35;
const FUNCTION_SHIFT: u32 = 40;
const CLASS_SHIFT: u32 = 49;
const SYSTEM_INSTANCE_SHIFT: u32 = 56;
const INDUSTRY_SHIFT: u32 = 60;
const AAC_SHIFT: u32 = 63;

/// Marine industry group.
pub const INDUSTRY_GROUP_MARINE: u8 = 4;

//==================================================================================NAME_FIELDS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Unpacked NAME. Values wider than their bit field are masked by
/// [`NameFields::pack`].
pub struct NameFields {
    pub unique_number: u32,
    pub manufacturer_code: u16,
    pub device_instance_lower: u8,
    pub device_instance_upper: u8,
    pub device_function: u8,
    pub device_class: u8,
    pub system_instance: u8,
    pub industry_group: u8,
    pub arbitrary_address_capable: bool,
}

impl NameFields {
    /// Pack every field into its bit position. The reserved bit stays clear.
    pub const fn pack(&self) -> IsoName {
        let raw = (self.unique_number as u64 & UNIQUE_NUMBER_MASK)
            | ((self.manufacturer_code as u64 & 0x7FF) << MANUFACTURER_SHIFT)
            | ((self.device_instance_lower as u64 & 0x07) << INSTANCE_LOWER_SHIFT)
            | ((self.device_instance_upper as u64 & 0x1F) << INSTANCE_UPPER_SHIFT)
            | ((self.device_function as u64) << FUNCTION_SHIFT)
            | ((self.device_class as u64 & 0x7F) << CLASS_SHIFT)
            | ((self.system_instance as u64 & 0x0F) << SYSTEM_INSTANCE_SHIFT)
            | ((self.industry_group as u64 & 0x07) << INDUSTRY_SHIFT)
            | ((self.arbitrary_address_capable as u64) << AAC_SHIFT);
        IsoName(raw)
    }
}

//==================================================================================ISO_NAME
/// Wrapper around the raw 64-bit NAME.
///
/// # Example
///
/// ```
/// use n2k_node::protocol::managment::iso_name::IsoName;
///
/// let name = IsoName::builder()
///     .unique_number(123456)
///     .manufacturer_code(2046)
///     .device_function(130)
///     .device_class(25)
///     .industry_group(4)
///     .arbitrary_address_capable(true)
///     .build();
///
/// assert_eq!(name.unique_number(), 123456);
/// assert!(name.is_marine());
/// assert_eq!(IsoName::from_le_bytes(name.to_le_bytes()), name);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IsoName(u64);

impl IsoName {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn builder() -> IsoNameBuilder {
        IsoNameBuilder::new()
    }

    /// Decode the 8-byte wire form.
    #[inline]
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Encode to the 8-byte wire form.
    #[inline]
    pub const fn to_le_bytes(&self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Split into individual fields.
    pub const fn unpack(&self) -> NameFields {
        NameFields {
            unique_number: self.unique_number(),
            manufacturer_code: self.manufacturer_code(),
            device_instance_lower: self.device_instance_lower(),
            device_instance_upper: self.device_instance_upper(),
            device_function: self.device_function(),
            device_class: self.device_class(),
            system_instance: self.system_instance(),
            industry_group: self.industry_group(),
            arbitrary_address_capable: self.is_arbitrary_address_capable(),
        }
    }

    #[inline]
    pub const fn unique_number(&self) -> u32 {
        (self.0 & UNIQUE_NUMBER_MASK) as u32
    }

    #[inline]
    pub const fn manufacturer_code(&self) -> u16 {
        ((self.0 >> MANUFACTURER_SHIFT) & 0x7FF) as u16
    }

    #[inline]
    pub const fn device_instance_lower(&self) -> u8 {
        ((self.0 >> INSTANCE_LOWER_SHIFT) & 0x07) as u8
    }

    #[inline]
    pub const fn device_instance_upper(&self) -> u8 {
        ((self.0 >> INSTANCE_UPPER_SHIFT) & 0x1F) as u8
    }

    /// Full 8-bit device instance (upper << 3 | lower).
    #[inline]
    pub const fn device_instance(&self) -> u8 {
        ((self.0 >> INSTANCE_LOWER_SHIFT) & 0xFF) as u8
    }

    #[inline]
    pub const fn device_function(&self) -> u8 {
        ((self.0 >> FUNCTION_SHIFT) & 0xFF) as u8
    }

    #[inline]
    pub const fn device_class(&self) -> u8 {
        ((self.0 >> CLASS_SHIFT) & 0x7F) as u8
    }

    #[inline]
    pub const fn system_instance(&self) -> u8 {
        ((self.0 >> SYSTEM_INSTANCE_SHIFT) & 0x0F) as u8
    }

    #[inline]
    pub const fn industry_group(&self) -> u8 {
        ((self.0 >> INDUSTRY_SHIFT) & 0x07) as u8
    }

    #[inline]
    pub const fn is_arbitrary_address_capable(&self) -> bool {
        ((self.0 >> AAC_SHIFT) & 0x01) != 0
    }

    #[inline]
    pub const fn is_marine(&self) -> bool {
        self.industry_group() == INDUSTRY_GROUP_MARINE
    }

    /// Copy with a new lower device instance (masked to 3 bits).
    pub const fn with_device_instance_lower(self, value: u8) -> Self {
        self.with_bits(INSTANCE_LOWER_SHIFT, 0x07, value as u64)
    }

    /// Copy with a new upper device instance (masked to 5 bits).
    pub const fn with_device_instance_upper(self, value: u8) -> Self {
        self.with_bits(INSTANCE_UPPER_SHIFT, 0x1F, value as u64)
    }

    /// Copy with a new 8-bit device instance spanning lower and upper parts.
    pub const fn with_device_instance(self, value: u8) -> Self {
        self.with_bits(INSTANCE_LOWER_SHIFT, 0xFF, value as u64)
    }

    /// Copy with a new system instance (masked to 4 bits).
    pub const fn with_system_instance(self, value: u8) -> Self {
        self.with_bits(SYSTEM_INSTANCE_SHIFT, 0x0F, value as u64)
    }

    const fn with_bits(self, shift: u32, mask: u64, value: u64) -> Self {
        Self((self.0 & !(mask << shift)) | ((value & mask) << shift))
    }
}

impl From<u64> for IsoName {
    #[inline]
    fn from(raw: u64) -> Self {
        Self::from_raw(raw)
    }
}

impl From<IsoName> for u64 {
    #[inline]
    fn from(name: IsoName) -> Self {
        name.raw()
    }
}

impl From<NameFields> for IsoName {
    fn from(fields: NameFields) -> Self {
        fields.pack()
    }
}

impl fmt::Display for IsoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IsoName {{ unique: {}, mfg: {}, func: {}, class: {}, inst: {}, sys: {} }}",
            self.unique_number(),
            self.manufacturer_code(),
            self.device_function(),
            self.device_class(),
            self.device_instance(),
            self.system_instance()
        )
    }
}

//==================================================================================ISO_NAME_BUILDER
/// Fluent builder over [`NameFields`]; out-of-range values are masked.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsoNameBuilder {
    fields: NameFields,
}

impl IsoNameBuilder {
    #[inline]
    pub const fn new() -> Self {
        Self {
            fields: NameFields {
                unique_number: 0,
                manufacturer_code: 0,
                device_instance_lower: 0,
                device_instance_upper: 0,
                device_function: 0,
                device_class: 0,
                system_instance: 0,
                industry_group: 0,
                arbitrary_address_capable: false,
            },
        }
    }

    pub const fn unique_number(mut self, value: u32) -> Self {
        self.fields.unique_number = value;
        self
    }

    pub const fn manufacturer_code(mut self, value: u16) -> Self {
        self.fields.manufacturer_code = value;
        self
    }

    pub const fn device_instance_lower(mut self, value: u8) -> Self {
        self.fields.device_instance_lower = value;
        self
    }

    pub const fn device_instance_upper(mut self, value: u8) -> Self {
        self.fields.device_instance_upper = value;
        self
    }

    /// Set the full 8-bit instance.
    pub const fn device_instance(self, value: u8) -> Self {
        self.device_instance_lower(value & 0x07)
            .device_instance_upper(value >> 3)
    }

    pub const fn device_function(mut self, value: u8) -> Self {
        self.fields.device_function = value;
        self
    }

    pub const fn device_class(mut self, value: u8) -> Self {
        self.fields.device_class = value;
        self
    }

    pub const fn system_instance(mut self, value: u8) -> Self {
        self.fields.system_instance = value;
        self
    }

    pub const fn industry_group(mut self, value: u8) -> Self {
        self.fields.industry_group = value;
        self
    }

    pub const fn arbitrary_address_capable(mut self, value: bool) -> Self {
        self.fields.arbitrary_address_capable = value;
        self
    }

    #[inline]
    pub const fn build(self) -> IsoName {
        self.fields.pack()
    }
}
