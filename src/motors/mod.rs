//! Control table definitions.

/// A field of a motor control table.
pub trait Register {
    /// Address of the first byte of the field.
    fn address(&self) -> u16;
    /// Width of the field in bytes.
    fn length(&self) -> u16;
}

macro_rules! register {
    ($($(#[$doc:meta])* $reg:ident : $addr:expr, $len:expr,)+) => {
        $(
            $(#[$doc])*
            #[derive(Clone, Copy, Debug)]
            pub struct $reg;
            impl $reg {
                /// Address of the first byte of the field.
                pub const ADDRESS: u16 = $addr;
                /// Width of the field in bytes.
                pub const LENGTH: u16 = $len;
            }
            impl super::Register for $reg {
                fn address(&self) -> u16 { $reg::ADDRESS }
                fn length(&self) -> u16 { $reg::LENGTH }
            }
        )+
    }
}

#[allow(non_snake_case)]
pub mod XL_430;

macro_rules! pack {
    ($l:expr, $h:expr) => (u16::from($h) << 8 | u16::from($l))
}
macro_rules! unpack {
    ($b:expr) => {
        ($b as u8, ($b >> 8) as u8)
    }
}
