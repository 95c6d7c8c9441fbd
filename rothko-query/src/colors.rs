// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Colour palettes for heatmaps.

/// An 8 bit per channel colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// The perceptually uniform viridis colour map, dark purple to yellow.
pub static VIRIDIS: [Color; 256] = [
    Color::new(0x44, 0x01, 0x54),
    Color::new(0x44, 0x02, 0x56),
    Color::new(0x45, 0x04, 0x57),
    Color::new(0x45, 0x05, 0x59),
    Color::new(0x46, 0x07, 0x5a),
    Color::new(0x46, 0x08, 0x5c),
    Color::new(0x46, 0x0a, 0x5d),
    Color::new(0x46, 0x0b, 0x5e),
    Color::new(0x47, 0x0d, 0x60),
    Color::new(0x47, 0x0e, 0x61),
    Color::new(0x47, 0x10, 0x63),
    Color::new(0x47, 0x11, 0x64),
    Color::new(0x47, 0x13, 0x65),
    Color::new(0x48, 0x14, 0x67),
    Color::new(0x48, 0x16, 0x68),
    Color::new(0x48, 0x17, 0x69),
    Color::new(0x48, 0x18, 0x6a),
    Color::new(0x48, 0x1a, 0x6c),
    Color::new(0x48, 0x1b, 0x6d),
    Color::new(0x48, 0x1c, 0x6e),
    Color::new(0x48, 0x1d, 0x6f),
    Color::new(0x48, 0x1f, 0x70),
    Color::new(0x48, 0x20, 0x71),
    Color::new(0x48, 0x21, 0x73),
    Color::new(0x48, 0x23, 0x74),
    Color::new(0x48, 0x24, 0x75),
    Color::new(0x48, 0x25, 0x76),
    Color::new(0x48, 0x26, 0x77),
    Color::new(0x48, 0x28, 0x78),
    Color::new(0x48, 0x29, 0x79),
    Color::new(0x47, 0x2a, 0x7a),
    Color::new(0x47, 0x2c, 0x7a),
    Color::new(0x47, 0x2d, 0x7b),
    Color::new(0x47, 0x2e, 0x7c),
    Color::new(0x47, 0x2f, 0x7d),
    Color::new(0x46, 0x30, 0x7e),
    Color::new(0x46, 0x32, 0x7e),
    Color::new(0x46, 0x33, 0x7f),
    Color::new(0x46, 0x34, 0x80),
    Color::new(0x45, 0x35, 0x81),
    Color::new(0x45, 0x37, 0x81),
    Color::new(0x45, 0x38, 0x82),
    Color::new(0x44, 0x39, 0x83),
    Color::new(0x44, 0x3a, 0x83),
    Color::new(0x44, 0x3b, 0x84),
    Color::new(0x43, 0x3d, 0x84),
    Color::new(0x43, 0x3e, 0x85),
    Color::new(0x42, 0x3f, 0x85),
    Color::new(0x42, 0x40, 0x86),
    Color::new(0x42, 0x41, 0x86),
    Color::new(0x41, 0x42, 0x87),
    Color::new(0x41, 0x44, 0x87),
    Color::new(0x40, 0x45, 0x88),
    Color::new(0x40, 0x46, 0x88),
    Color::new(0x3f, 0x47, 0x88),
    Color::new(0x3f, 0x48, 0x89),
    Color::new(0x3e, 0x49, 0x89),
    Color::new(0x3e, 0x4a, 0x89),
    Color::new(0x3e, 0x4c, 0x8a),
    Color::new(0x3d, 0x4d, 0x8a),
    Color::new(0x3d, 0x4e, 0x8a),
    Color::new(0x3c, 0x4f, 0x8a),
    Color::new(0x3c, 0x50, 0x8b),
    Color::new(0x3b, 0x51, 0x8b),
    Color::new(0x3b, 0x52, 0x8b),
    Color::new(0x3a, 0x53, 0x8b),
    Color::new(0x3a, 0x54, 0x8c),
    Color::new(0x39, 0x55, 0x8c),
    Color::new(0x39, 0x56, 0x8c),
    Color::new(0x38, 0x58, 0x8c),
    Color::new(0x38, 0x59, 0x8c),
    Color::new(0x37, 0x5a, 0x8c),
    Color::new(0x37, 0x5b, 0x8d),
    Color::new(0x36, 0x5c, 0x8d),
    Color::new(0x36, 0x5d, 0x8d),
    Color::new(0x35, 0x5e, 0x8d),
    Color::new(0x35, 0x5f, 0x8d),
    Color::new(0x34, 0x60, 0x8d),
    Color::new(0x34, 0x61, 0x8d),
    Color::new(0x33, 0x62, 0x8d),
    Color::new(0x33, 0x63, 0x8d),
    Color::new(0x32, 0x64, 0x8e),
    Color::new(0x32, 0x65, 0x8e),
    Color::new(0x31, 0x66, 0x8e),
    Color::new(0x31, 0x67, 0x8e),
    Color::new(0x31, 0x68, 0x8e),
    Color::new(0x30, 0x69, 0x8e),
    Color::new(0x30, 0x6a, 0x8e),
    Color::new(0x2f, 0x6b, 0x8e),
    Color::new(0x2f, 0x6c, 0x8e),
    Color::new(0x2e, 0x6d, 0x8e),
    Color::new(0x2e, 0x6e, 0x8e),
    Color::new(0x2e, 0x6f, 0x8e),
    Color::new(0x2d, 0x70, 0x8e),
    Color::new(0x2d, 0x71, 0x8e),
    Color::new(0x2c, 0x71, 0x8e),
    Color::new(0x2c, 0x72, 0x8e),
    Color::new(0x2c, 0x73, 0x8e),
    Color::new(0x2b, 0x74, 0x8e),
    Color::new(0x2b, 0x75, 0x8e),
    Color::new(0x2a, 0x76, 0x8e),
    Color::new(0x2a, 0x77, 0x8e),
    Color::new(0x2a, 0x78, 0x8e),
    Color::new(0x29, 0x79, 0x8e),
    Color::new(0x29, 0x7a, 0x8e),
    Color::new(0x29, 0x7b, 0x8e),
    Color::new(0x28, 0x7c, 0x8e),
    Color::new(0x28, 0x7d, 0x8e),
    Color::new(0x27, 0x7e, 0x8e),
    Color::new(0x27, 0x7f, 0x8e),
    Color::new(0x27, 0x80, 0x8e),
    Color::new(0x26, 0x81, 0x8e),
    Color::new(0x26, 0x82, 0x8e),
    Color::new(0x26, 0x82, 0x8e),
    Color::new(0x25, 0x83, 0x8e),
    Color::new(0x25, 0x84, 0x8e),
    Color::new(0x25, 0x85, 0x8e),
    Color::new(0x24, 0x86, 0x8e),
    Color::new(0x24, 0x87, 0x8e),
    Color::new(0x23, 0x88, 0x8e),
    Color::new(0x23, 0x89, 0x8e),
    Color::new(0x23, 0x8a, 0x8d),
    Color::new(0x22, 0x8b, 0x8d),
    Color::new(0x22, 0x8c, 0x8d),
    Color::new(0x22, 0x8d, 0x8d),
    Color::new(0x21, 0x8e, 0x8d),
    Color::new(0x21, 0x8f, 0x8d),
    Color::new(0x21, 0x90, 0x8d),
    Color::new(0x21, 0x91, 0x8c),
    Color::new(0x20, 0x92, 0x8c),
    Color::new(0x20, 0x92, 0x8c),
    Color::new(0x20, 0x93, 0x8c),
    Color::new(0x1f, 0x94, 0x8c),
    Color::new(0x1f, 0x95, 0x8b),
    Color::new(0x1f, 0x96, 0x8b),
    Color::new(0x1f, 0x97, 0x8b),
    Color::new(0x1f, 0x98, 0x8b),
    Color::new(0x1f, 0x99, 0x8a),
    Color::new(0x1f, 0x9a, 0x8a),
    Color::new(0x1e, 0x9b, 0x8a),
    Color::new(0x1e, 0x9c, 0x89),
    Color::new(0x1e, 0x9d, 0x89),
    Color::new(0x1f, 0x9e, 0x89),
    Color::new(0x1f, 0x9f, 0x88),
    Color::new(0x1f, 0xa0, 0x88),
    Color::new(0x1f, 0xa1, 0x88),
    Color::new(0x1f, 0xa1, 0x87),
    Color::new(0x1f, 0xa2, 0x87),
    Color::new(0x20, 0xa3, 0x86),
    Color::new(0x20, 0xa4, 0x86),
    Color::new(0x21, 0xa5, 0x85),
    Color::new(0x21, 0xa6, 0x85),
    Color::new(0x22, 0xa7, 0x85),
    Color::new(0x22, 0xa8, 0x84),
    Color::new(0x23, 0xa9, 0x83),
    Color::new(0x24, 0xaa, 0x83),
    Color::new(0x25, 0xab, 0x82),
    Color::new(0x25, 0xac, 0x82),
    Color::new(0x26, 0xad, 0x81),
    Color::new(0x27, 0xad, 0x81),
    Color::new(0x28, 0xae, 0x80),
    Color::new(0x29, 0xaf, 0x7f),
    Color::new(0x2a, 0xb0, 0x7f),
    Color::new(0x2c, 0xb1, 0x7e),
    Color::new(0x2d, 0xb2, 0x7d),
    Color::new(0x2e, 0xb3, 0x7c),
    Color::new(0x2f, 0xb4, 0x7c),
    Color::new(0x31, 0xb5, 0x7b),
    Color::new(0x32, 0xb6, 0x7a),
    Color::new(0x34, 0xb6, 0x79),
    Color::new(0x35, 0xb7, 0x79),
    Color::new(0x37, 0xb8, 0x78),
    Color::new(0x38, 0xb9, 0x77),
    Color::new(0x3a, 0xba, 0x76),
    Color::new(0x3b, 0xbb, 0x75),
    Color::new(0x3d, 0xbc, 0x74),
    Color::new(0x3f, 0xbc, 0x73),
    Color::new(0x40, 0xbd, 0x72),
    Color::new(0x42, 0xbe, 0x71),
    Color::new(0x44, 0xbf, 0x70),
    Color::new(0x46, 0xc0, 0x6f),
    Color::new(0x48, 0xc1, 0x6e),
    Color::new(0x4a, 0xc1, 0x6d),
    Color::new(0x4c, 0xc2, 0x6c),
    Color::new(0x4e, 0xc3, 0x6b),
    Color::new(0x50, 0xc4, 0x6a),
    Color::new(0x52, 0xc5, 0x69),
    Color::new(0x54, 0xc5, 0x68),
    Color::new(0x56, 0xc6, 0x67),
    Color::new(0x58, 0xc7, 0x65),
    Color::new(0x5a, 0xc8, 0x64),
    Color::new(0x5c, 0xc8, 0x63),
    Color::new(0x5e, 0xc9, 0x62),
    Color::new(0x60, 0xca, 0x60),
    Color::new(0x63, 0xcb, 0x5f),
    Color::new(0x65, 0xcb, 0x5e),
    Color::new(0x67, 0xcc, 0x5c),
    Color::new(0x69, 0xcd, 0x5b),
    Color::new(0x6c, 0xcd, 0x5a),
    Color::new(0x6e, 0xce, 0x58),
    Color::new(0x70, 0xcf, 0x57),
    Color::new(0x73, 0xd0, 0x56),
    Color::new(0x75, 0xd0, 0x54),
    Color::new(0x77, 0xd1, 0x53),
    Color::new(0x7a, 0xd1, 0x51),
    Color::new(0x7c, 0xd2, 0x50),
    Color::new(0x7f, 0xd3, 0x4e),
    Color::new(0x81, 0xd3, 0x4d),
    Color::new(0x84, 0xd4, 0x4b),
    Color::new(0x86, 0xd5, 0x49),
    Color::new(0x89, 0xd5, 0x48),
    Color::new(0x8b, 0xd6, 0x46),
    Color::new(0x8e, 0xd6, 0x45),
    Color::new(0x90, 0xd7, 0x43),
    Color::new(0x93, 0xd7, 0x41),
    Color::new(0x95, 0xd8, 0x40),
    Color::new(0x98, 0xd8, 0x3e),
    Color::new(0x9b, 0xd9, 0x3c),
    Color::new(0x9d, 0xd9, 0x3b),
    Color::new(0xa0, 0xda, 0x39),
    Color::new(0xa2, 0xda, 0x37),
    Color::new(0xa5, 0xdb, 0x36),
    Color::new(0xa8, 0xdb, 0x34),
    Color::new(0xaa, 0xdc, 0x32),
    Color::new(0xad, 0xdc, 0x30),
    Color::new(0xb0, 0xdd, 0x2f),
    Color::new(0xb2, 0xdd, 0x2d),
    Color::new(0xb5, 0xde, 0x2b),
    Color::new(0xb8, 0xde, 0x29),
    Color::new(0xba, 0xde, 0x28),
    Color::new(0xbd, 0xdf, 0x26),
    Color::new(0xc0, 0xdf, 0x25),
    Color::new(0xc2, 0xdf, 0x23),
    Color::new(0xc5, 0xe0, 0x21),
    Color::new(0xc8, 0xe0, 0x20),
    Color::new(0xca, 0xe1, 0x1f),
    Color::new(0xcd, 0xe1, 0x1d),
    Color::new(0xd0, 0xe1, 0x1c),
    Color::new(0xd2, 0xe2, 0x1b),
    Color::new(0xd5, 0xe2, 0x1a),
    Color::new(0xd8, 0xe2, 0x19),
    Color::new(0xda, 0xe3, 0x19),
    Color::new(0xdd, 0xe3, 0x18),
    Color::new(0xdf, 0xe3, 0x18),
    Color::new(0xe2, 0xe4, 0x18),
    Color::new(0xe5, 0xe4, 0x19),
    Color::new(0xe7, 0xe4, 0x19),
    Color::new(0xea, 0xe5, 0x1a),
    Color::new(0xec, 0xe5, 0x1b),
    Color::new(0xef, 0xe5, 0x1c),
    Color::new(0xf1, 0xe5, 0x1d),
    Color::new(0xf4, 0xe6, 0x1e),
    Color::new(0xf6, 0xe6, 0x20),
    Color::new(0xf8, 0xe6, 0x21),
    Color::new(0xfb, 0xe7, 0x23),
    Color::new(0xfd, 0xe7, 0x25),
];
