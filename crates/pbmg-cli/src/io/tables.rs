use pbmg::core::models::atom::{Atom, AtomForce};
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct AtomRecord {
    atom: usize,
    x: f64,
    y: f64,
    z: f64,
    charge: f64,
    radius: f64,
    potential_kt_per_e: f64,
    energy_kt: f64,
}

#[derive(Serialize)]
struct TotalForceRecord {
    atom: usize,
    fx: f64,
    fy: f64,
    fz: f64,
}

#[derive(Serialize)]
struct ComponentForceRecord {
    atom: usize,
    qf_x: f64,
    qf_y: f64,
    qf_z: f64,
    db_x: f64,
    db_y: f64,
    db_z: f64,
    ib_x: f64,
    ib_y: f64,
    ib_z: f64,
    np_x: f64,
    np_y: f64,
    np_z: f64,
    total_x: f64,
    total_y: f64,
    total_z: f64,
}

/// Per-atom potentials and energies, one row per atom.
pub fn write_atom_table<W: Write>(
    writer: W,
    atoms: &[Atom],
    potentials: &[f64],
    energies: &[f64],
) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for (index, ((atom, &potential), &energy)) in
        atoms.iter().zip(potentials).zip(energies).enumerate()
    {
        let [x, y, z] = atom.coords();
        csv.serialize(AtomRecord {
            atom: index + 1,
            x,
            y,
            z,
            charge: atom.charge,
            radius: atom.radius,
            potential_kt_per_e: potential,
            energy_kt: energy,
        })?;
    }
    csv.flush()?;
    Ok(())
}

/// Per-atom forces in kT/Å, either summed or split into qf/db/ib/np components.
pub fn write_force_table<W: Write>(
    writer: W,
    forces: &[AtomForce],
    components: bool,
) -> csv::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for (index, force) in forces.iter().enumerate() {
        let total = force.total();
        if components {
            csv.serialize(ComponentForceRecord {
                atom: index + 1,
                qf_x: force.qf.x,
                qf_y: force.qf.y,
                qf_z: force.qf.z,
                db_x: force.db.x,
                db_y: force.db.y,
                db_z: force.db.z,
                ib_x: force.ib.x,
                ib_y: force.ib.y,
                ib_z: force.ib.z,
                np_x: force.np.x,
                np_y: force.np.y,
                np_z: force.np.z,
                total_x: total.x,
                total_y: total.y,
                total_z: total.z,
            })?;
        } else {
            csv.serialize(TotalForceRecord {
                atom: index + 1,
                fx: total.x,
                fy: total.y,
                fz: total.z,
            })?;
        }
    }
    csv.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};

    fn forces() -> Vec<AtomForce> {
        vec![
            AtomForce {
                qf: Vector3::new(1.0, 0.0, 0.0),
                db: Vector3::new(0.5, 0.0, 0.0),
                ib: Vector3::new(0.0, 0.25, 0.0),
                np: Vector3::new(0.0, 0.0, -1.0),
            },
            AtomForce::default(),
        ]
    }

    #[test]
    fn total_force_table_has_header_and_summed_rows() {
        let mut buffer = Vec::new();
        write_force_table(&mut buffer, &forces(), false).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "atom,fx,fy,fz");
        assert_eq!(lines[1], "1,1.5,0.25,-1.0");
        assert_eq!(lines[2], "2,0.0,0.0,0.0");
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn component_force_table_keeps_every_term() {
        let mut buffer = Vec::new();
        write_force_table(&mut buffer, &forces(), true).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let header: Vec<&str> = text.lines().next().unwrap().split(',').collect();
        assert_eq!(header.len(), 16);
        assert_eq!(header[1], "qf_x");
        assert_eq!(header[15], "total_z");
        let first: Vec<&str> = text.lines().nth(1).unwrap().split(',').collect();
        assert_eq!(first[4], "0.5");
        assert_eq!(first[14], "0.25");
    }

    #[test]
    fn atom_table_lists_positions_potentials_and_energies() {
        let atoms = vec![
            Atom::new(Point3::new(1.0, 2.0, 3.0), -0.5, 1.5),
            Atom::new(Point3::new(0.0, 0.0, 0.0), 1.0, 2.0),
        ];
        let mut buffer = Vec::new();
        write_atom_table(&mut buffer, &atoms, &[2.0, -4.0], &[-1.0, -4.0]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "atom,x,y,z,charge,radius,potential_kt_per_e,energy_kt"
        );
        assert_eq!(lines[1], "1,1.0,2.0,3.0,-0.5,1.5,2.0,-1.0");
        assert_eq!(lines.len(), 3);
    }
}
