// This file is part of the bin2c package.
//
// For the full copyright and license information, please view the LICENSE
// file that was distributed with this source code.

fn main() {
    std::process::exit(bin2c::run(std::env::args_os()));
}
