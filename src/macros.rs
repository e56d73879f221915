// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

/// Print a user-visible error to stderr as `ERROR: <message>`.
#[macro_export]
macro_rules! show_error(
    ($($args:tt)+) => ({
        eprint!("ERROR: ");
        eprintln!($($args)+);
    })
);
