//! TEAM_430: Error infrastructure shared by the hibernation crates.
//!
//! Every subsystem declares its errors through [`define_kernel_error!`], which
//! gives each variant a stable 16-bit code (`subsystem << 8 | local`) so that a
//! failure logged on the serial console before a power cut can be matched to the
//! variant after the next boot.
//!
//! ```ignore
//! define_kernel_error! {
//!     pub enum BackupError(0x21) {
//!         Exhausted = 0x01 => "Backup state area exhausted",
//!         Record(RecordError) = 0x02 => "Record rejected",
//!     }
//! }
//! ```

#![no_std]

/// Declare a subsystem error enum.
///
/// Variants are either plain or wrap a single inner error (which must itself be
/// `Copy + Display`). The generated type derives `Debug, Clone, Copy, PartialEq,
/// Eq` and implements `Display` and `core::error::Error`.
#[macro_export]
macro_rules! define_kernel_error {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($subsystem:literal) {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $(($inner:ty))? = $code:literal => $desc:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $(($inner))?,
            )*
        }

        impl $name {
            /// Subsystem identifier shared by every variant.
            pub const SUBSYSTEM: u8 = $subsystem;

            /// Variant code local to the subsystem.
            pub const fn local_code(&self) -> u8 {
                match self {
                    $(
                        $crate::define_kernel_error!(@arm $variant $(($inner))?) => $code,
                    )*
                }
            }

            /// Full error code: subsystem in the high byte, variant in the low byte.
            pub const fn code(&self) -> u16 {
                ((Self::SUBSYSTEM as u16) << 8) | self.local_code() as u16
            }

            /// Static description, suitable for log lines.
            pub const fn name(&self) -> &'static str {
                match self {
                    $(
                        $crate::define_kernel_error!(@arm $variant $(($inner))?) => $desc,
                    )*
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "E{:04X}: {}", self.code(), self.name())?;
                match self {
                    $(
                        $crate::define_kernel_error!(@bind $variant $(($inner))? inner) => {
                            $crate::define_kernel_error!(@cause f $(($inner))? inner)
                        }
                    )*
                }
            }
        }

        impl core::error::Error for $name {}
    };

    // Pattern ignoring any payload.
    (@arm $variant:ident ($inner:ty)) => { Self::$variant(_) };
    (@arm $variant:ident) => { Self::$variant };

    // Pattern binding the payload (if any) to `$bind`.
    (@bind $variant:ident ($inner:ty) $bind:ident) => { Self::$variant($bind) };
    (@bind $variant:ident $bind:ident) => { Self::$variant };

    // Append the wrapped cause, if the variant has one.
    (@cause $f:ident ($inner:ty) $bind:ident) => { write!($f, " ({})", $bind) };
    (@cause $f:ident $bind:ident) => { Ok(()) };
}
