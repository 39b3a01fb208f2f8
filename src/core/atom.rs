use crate::core::periodic_table::{element_mass, element_vdw_radius};
use crate::core::{ConfigurationError, Property, PropertyMap};

/// Information about a single particle: everything except its coordinates.
///
/// The `name` is whatever the file called the atom (`CA`, `1HB2`), while the
/// `type_name` identifies the particle kind for force-field purposes. When a
/// format carries no explicit type, the type defaults to the name.
#[derive(Debug, Default, Clone)]
pub struct Atom {
    name: String,
    type_name: String,
    mass: f64,
    charge: f64,
    properties: PropertyMap,
}

impl Atom {
    /// Create an atom with the given name. The type is set to the name and
    /// the mass is filled from the periodic table when the name maps to a
    /// known element.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let mass = element_mass(&name).unwrap_or(0.0);
        Atom {
            type_name: name.clone(),
            name,
            mass,
            charge: 0.0,
            properties: PropertyMap::new(),
        }
    }

    /// Create an atom with separate name and type. The mass is filled from
    /// the type.
    pub fn with_type(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        let mass = element_mass(&type_name).unwrap_or(0.0);
        Atom {
            name: name.into(),
            type_name,
            mass,
            charge: 0.0,
            properties: PropertyMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn set_type_name(&mut self, type_name: impl Into<String>) {
        self.type_name = type_name.into();
    }

    /// Mass in amu.
    pub fn mass(&self) -> f64 {
        self.mass
    }

    pub fn set_mass(&mut self, mass: f64) -> Result<(), ConfigurationError> {
        if mass < 0.0 {
            return Err(ConfigurationError::NegativeMass(mass));
        }
        self.mass = mass;
        Ok(())
    }

    /// Charge in units of the electron charge.
    pub fn charge(&self) -> f64 {
        self.charge
    }

    pub fn set_charge(&mut self, charge: f64) {
        self.charge = charge;
    }

    /// Van der Waals radius in angstroms, looked up from the type first and
    /// the name second. `None` if neither maps to a known element.
    pub fn vdw_radius(&self) -> Option<f64> {
        element_vdw_radius(&self.type_name).or_else(|| element_vdw_radius(&self.name))
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Property>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }
}

// Atoms compare by their intrinsic fields only
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.type_name == other.type_name
            && self.mass == other.mass
            && self.charge == other.charge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_from_name() {
        let atom = Atom::new("O");
        assert_eq!(atom.type_name(), "O");
        assert!((atom.mass() - 15.9994).abs() < 1e-10);

        let atom = Atom::new("OW1");
        assert!((atom.mass() - 15.9994).abs() < 1e-10);

        let atom = Atom::new("");
        assert_eq!(atom.mass(), 0.0);
    }

    #[test]
    fn set_mass_rejects_negative() {
        let mut atom = Atom::new("C");
        assert!(atom.set_mass(-1.0).is_err());
        atom.set_mass(13.0).unwrap();
        assert_eq!(atom.mass(), 13.0);
    }

    #[test]
    fn equality_ignores_properties() {
        let mut a = Atom::new("O");
        let b = Atom::new("O");
        a.set("flag", true);
        assert_eq!(a, b);

        let c = Atom::with_type("O", "OW");
        assert_ne!(a, c);
    }

    #[test]
    fn vdw_radius() {
        assert_eq!(Atom::new("H").vdw_radius(), Some(1.2));
        assert_eq!(Atom::new("??").vdw_radius(), None);
    }
}
