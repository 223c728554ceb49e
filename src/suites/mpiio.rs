//! MPI-IO tests through ROMIO's pvfs2 driver, using the OpenMPI build made
//! during setup.

use anyhow::{anyhow, Result};

use super::{on_mount, run};
use crate::node::{CommandResult, Node};
use crate::runner::NamedTest;

const SOURCE: &str = "~/mpiio-rw.c";
const PROGRAM: &str = "~/mpiio-rw";

/// Every rank writes its own block collectively, reads it back and exits
/// non-zero on a mismatch.
const PROGRAM_SOURCE: &str = r#"#include <mpi.h>
#include <stdio.h>
#include <string.h>

#define BLOCK 1048576

int main(int argc, char **argv)
{
    static char out[BLOCK], in[BLOCK];
    int rank, errors = 0, total = 0;
    MPI_File fh;
    MPI_Offset offset;

    MPI_Init(&argc, &argv);
    MPI_Comm_rank(MPI_COMM_WORLD, &rank);
    memset(out, 'a' + rank % 26, BLOCK);
    offset = (MPI_Offset) rank * BLOCK;

    if (MPI_File_open(MPI_COMM_WORLD, argv[1], MPI_MODE_CREATE | MPI_MODE_RDWR,
                      MPI_INFO_NULL, &fh) != MPI_SUCCESS) {
        fprintf(stderr, "rank %d: cannot open %s\n", rank, argv[1]);
        MPI_Abort(MPI_COMM_WORLD, 2);
    }
    MPI_File_write_at_all(fh, offset, out, BLOCK, MPI_CHAR, MPI_STATUS_IGNORE);
    MPI_File_sync(fh);
    MPI_File_read_at_all(fh, offset, in, BLOCK, MPI_CHAR, MPI_STATUS_IGNORE);
    MPI_File_close(&fh);

    if (memcmp(in, out, BLOCK) != 0)
        errors = 1;
    MPI_Allreduce(&errors, &total, 1, MPI_INT, MPI_SUM, MPI_COMM_WORLD);
    if (rank == 0)
        printf("%d ranks with errors\n", total);
    MPI_Finalize();
    return total == 0 ? 0 : 1;
}
"#;

pub fn tests() -> Vec<NamedTest> {
    vec![
        NamedTest::new("compile", compile),
        NamedTest::new("collective_rw", collective_rw),
    ]
}

fn openmpi_bin(node: &Node, program: &str) -> Result<String> {
    let prefix = node
        .paths
        .openmpi
        .as_deref()
        .ok_or_else(|| anyhow!("OpenMPI is not installed on {}", node.label()))?;
    Ok(format!("{}/bin/{}", prefix, program))
}

fn compile(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let mpicc = openmpi_bin(node, "mpicc")?;
    let command = format!(
        "cat > {source} <<'EOF'\n{code}EOF\n{mpicc} -o {program} {source}",
        source = SOURCE,
        code = PROGRAM_SOURCE,
        mpicc = mpicc,
        program = PROGRAM
    );
    Ok(run(node, last, &command))
}

fn collective_rw(node: &mut Node, last: &mut CommandResult) -> Result<i32> {
    let mpirun = openmpi_bin(node, "mpirun")?;
    let file = on_mount(node, "mpiio-rw.dat");
    let command = format!("{} -np 4 {} pvfs2:{}", mpirun, PROGRAM, file);
    Ok(run(node, last, &command))
}
