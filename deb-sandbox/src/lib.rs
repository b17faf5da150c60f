// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Install Debian packages into a confined virtual filesystem root.

This crate unpacks the payload of `.deb` files into a directory acting as a
virtual root and tracks which files each package owns, so packages can later
be removed. It is not `dpkg`: there are no maintainer scripts, no dependency
resolution, no signature verification and no control file interpretation.
Only the `data.tar` payload of a package is consumed.

# Security

Archive content is untrusted. Every filesystem mutation is preceded by a
confinement check ([confine::VirtualRoot::confine()]) which resolves the
candidate path, symlinks included, and refuses anything that doesn't land at
or beneath the root. `..` traversal, absolute member names and symlinks
planted inside the root cannot be used to write elsewhere.

# A Tour of Functionality

[ar::ArArchive] iterates the members of an `ar` archive, which is the outer
container of a `.deb`.

[deb::reader::DataTarReader] locates the first `data.tar*` member, decodes it
according to [deb::PayloadCodec] and exposes its tar entries.

[install::ConfinedInstaller] writes those entries beneath a
[confine::VirtualRoot], recording every path written.

[registry::PackageRegistry] maps package names to the paths they installed
and persists that mapping as JSON. Removal deletes paths deepest first.

[lookup::RegistryLookup] resolves package names to URLs and
[fetch::DebFetcher] downloads them.

[engine::SandboxEngine] ties all of the above together and is the main
entry point. [layout::SandboxLayout] describes where it keeps its state.

# Crate Features

The `http` feature (enabled by default) enables downloading over HTTP via
`reqwest`. Without it, [fetch::UrlFetcher] only supports `file://` URLs.
*/

pub mod ar;
pub mod confine;
pub mod deb;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod install;
pub mod layout;
pub mod lookup;
pub mod registry;

#[cfg(test)]
mod testutil;

pub use {
    engine::{EngineConfig, SandboxEngine},
    error::{Result, SandboxError},
    layout::SandboxLayout,
};
