use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use mdio::prelude::*;

fn temp_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("mdio-it-{}-{}", std::process::id(), name));
    path
}

fn write_water_xyz(path: &PathBuf, steps: usize) -> Result<()> {
    let mut content = String::new();
    for step in 0..steps {
        content.push_str("3\n generated by VMD\n");
        content.push_str(&format!(
            "O {:.6} 8.303366 11.737172\nH 1.320290 8.480326 11.470000\nH 0.332400 8.726662 12.617169\n",
            0.417219 + step as f64
        ));
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[test]
fn read_xyz_trajectory() -> Result<()> {
    let path = temp_path("water.xyz");
    write_water_xyz(&path, 3)?;

    let mut trajectory = Trajectory::open(&path)?;
    assert_eq!(trajectory.nsteps(), 3);

    let frame = trajectory.read()?;
    assert_eq!(frame.size(), 3);
    assert!((frame.positions()[0] - Vector3D::new(0.417219, 8.303366, 11.737172)).norm() < 1e-5);

    let frame = trajectory.read()?;
    assert_eq!(frame.step(), 1);
    assert!((frame.positions()[0][0] - 1.417219).abs() < 1e-5);

    trajectory.read()?;
    assert!(trajectory.done());

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn read_gzipped_xyz() -> Result<()> {
    let path = temp_path("water.6.xyz.gz");
    {
        let plain = temp_path("tmp-water.xyz");
        write_water_xyz(&plain, 2)?;
        let content = std::fs::read_to_string(&plain)?;
        std::fs::remove_file(&plain)?;

        let mut file =
            mdio::files::TextFile::open(&path, Mode::Write, Compression::Auto)?;
        write!(file, "{content}")?;
        file.close()?;
    }

    // The gzip substrate is transparent to the format
    let mut file = mdio::files::TextFile::open(&path, Mode::Read, Compression::Auto)?;
    assert_eq!(file.readline()?, "3");
    assert_eq!(file.readline()?, " generated by VMD");
    drop(file);

    let mut trajectory = Trajectory::open(&path)?;
    assert_eq!(trajectory.nsteps(), 2);
    let frame = trajectory.read_step(1)?;
    assert!((frame.positions()[0][0] - 1.417219).abs() < 1e-5);

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn sdf_write_layout_and_bonds() -> Result<()> {
    let path = temp_path("out.sdf");

    let mut frame = Frame::new();
    for name in ["O", "N", "C", "F"] {
        frame.add_atom(Atom::new(name), Vector3D::new(1.0, 2.0, 3.0), None);
    }
    frame.add_bond(0, 2, BondOrder::Single)?;
    frame.add_bond(1, 2, BondOrder::Double)?;
    frame.add_bond(2, 3, BondOrder::Triple)?;

    let mut trajectory = Trajectory::create(&path)?;
    trajectory.write(&frame)?;
    trajectory.close()?;

    let content = std::fs::read_to_string(&path)?;
    assert!(content.contains("  4  3  0"));
    assert!(content.contains("  1  3  1"));
    assert!(content.contains("  2  3  2"));
    assert!(content.contains("  3  4  3"));

    let mut trajectory = Trajectory::open(&path)?;
    let copy = trajectory.read()?;
    assert_eq!(copy.size(), 4);
    assert_eq!(copy.topology().bond_order(0, 2), Some(BondOrder::Single));
    assert_eq!(copy.topology().bond_order(1, 2), Some(BondOrder::Double));
    assert_eq!(copy.topology().bond_order(2, 3), Some(BondOrder::Triple));

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn gro_roundtrip_through_trajectory() -> Result<()> {
    let path = temp_path("conf.gro");

    let mut frame = Frame::new();
    frame.add_atom(Atom::new("OW"), Vector3D::new(1.26, 16.24, 16.79), None);
    frame.add_atom(Atom::new("HW1"), Vector3D::new(1.90, 16.61, 17.47), None);
    frame.add_atom(Atom::new("HW2"), Vector3D::new(1.77, 15.68, 16.13), None);
    frame.set_cell(UnitCell::orthorhombic(18.206, 18.206, 18.206)?);

    let mut trajectory = Trajectory::create(&path)?;
    trajectory.write(&frame)?;
    trajectory.close()?;

    let mut trajectory = Trajectory::open(&path)?;
    let copy = trajectory.read()?;
    assert_eq!(copy.size(), 3);
    for (a, b) in copy.positions().iter().zip(frame.positions()) {
        assert!((a - b).norm() < 5e-3);
    }
    assert!((copy.cell().a() - frame.cell().a()).abs() < 5e-4);

    std::fs::remove_file(&path)?;
    Ok(())
}

#[test]
fn guessed_bonds_and_selection() -> Result<()> {
    let mut frame = Frame::new();
    frame.add_atom(Atom::new("O"), Vector3D::new(0.0, 0.0, 0.0), None);
    frame.add_atom(Atom::new("H"), Vector3D::new(1.0, 0.0, 0.0), None);
    frame.add_atom(Atom::new("H"), Vector3D::new(-1.0, 0.0, 0.0), None);
    frame.guess_bonds()?;

    assert_eq!(frame.topology().bonds().len(), 2);
    assert_eq!(frame.topology().angles().len(), 1);

    let selection = Selection::new("name == O and index < 10")?;
    assert_eq!(selection.list(&frame)?.to_vec(), vec![0]);

    let bonded = Selection::new("pairs: is_bonded(#1, #2)")?;
    assert_eq!(bonded.evaluate(&frame)?.len(), 4);
    Ok(())
}

#[test]
fn registry_rejects_duplicates() {
    let mut registry = FormatRegistry::with_builtin_formats();
    let clone = FormatMetadata {
        name: "GRO",
        extension: None,
        description: "duplicate",
        supports_read: true,
        supports_write: false,
        supports_append: false,
    };
    fn dummy(
        _: &std::path::Path,
        _: Mode,
        _: Compression,
    ) -> std::result::Result<Box<dyn Format>, FormatError> {
        unimplemented!("never constructed")
    }
    assert!(registry.register(clone, dummy).is_err());
}
