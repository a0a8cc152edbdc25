/*!
# Entity declarations and resolution

Storage for general entities declared in the internal subset, plus the
resolver seam through which external entity content is obtained. The five
predefined entities (`amp`, `lt`, `gt`, `apos`, `quot`) are not stored here;
the lexer expands them inline.
*/
use std::collections::HashMap;
use std::io;

use crate::strings::{CData, CDataStr, Name};

/// Definition of a general entity.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityDef {
	/// Internal entity with its replacement text.
	///
	/// Character references in the entity value are already expanded;
	/// general entity references are kept verbatim and expand recursively
	/// at the point of use (XML 1.0 § 4.4.8).
	Internal(CData),

	/// External parsed entity, identified by its system identifier and an
	/// optional public identifier. The content is obtained through an
	/// [`EntityResolver`] at the point of use.
	External {
		public_id: Option<CData>,
		system_id: CData,
	},
}

/// Whether a resolved reference expanded to internal replacement text or to
/// externally fetched content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementOrigin {
	Internal,
	External,
}

/// Table of declared general entities.
///
/// As mandated by XML 1.0 § 4.2, the first declaration of an entity binds;
/// later declarations of the same name are ignored.
#[derive(Debug, Clone)]
pub struct EntityMap {
	map: HashMap<Name, EntityDef>,
}

impl EntityMap {
	pub fn new() -> EntityMap {
		EntityMap {
			map: HashMap::new(),
		}
	}

	/// Record a declaration. Returns false if the name was already bound
	/// (in which case the new definition is discarded).
	pub fn declare(&mut self, name: Name, def: EntityDef) -> bool {
		match self.map.entry(name) {
			std::collections::hash_map::Entry::Occupied(_) => false,
			std::collections::hash_map::Entry::Vacant(e) => {
				e.insert(def);
				true
			}
		}
	}

	pub fn get(&self, name: &Name) -> Option<&EntityDef> {
		self.map.get(name)
	}

	pub fn len(&self) -> usize {
		self.map.len()
	}
}

/// Hook through which the content of external parsed entities is obtained.
///
/// Returning `Ok(None)` means the resolver declines; the parser then treats
/// the entity as undeclared (fatal or a warning, depending on strictness).
/// The returned bytes are a fresh input in their own right: they run through
/// encoding detection like the document itself.
pub trait EntityResolver {
	fn resolve(
		&mut self,
		public_id: Option<&CDataStr>,
		system_id: &CDataStr,
	) -> io::Result<Option<Vec<u8>>>;
}

/// Default resolver which declines everything.
///
/// With this resolver, any reference to an external entity is handled like a
/// reference to an undeclared entity.
pub struct NoResolver;

impl EntityResolver for NoResolver {
	fn resolve(
		&mut self,
		_public_id: Option<&CDataStr>,
		_system_id: &CDataStr,
	) -> io::Result<Option<Vec<u8>>> {
		Ok(None)
	}
}
